use std::io::Write;
use std::process::Output;

pub use assert_cmd::Command;

pub trait CommandExt {
    /// Same as [Command::output], but echoes stdout/stderr so libtest shows them for failed tests
    fn captured_output(&mut self) -> std::io::Result<Output>;
}

impl CommandExt for Command {
    fn captured_output(&mut self) -> std::io::Result<Output> {
        let output = self.output()?;

        // print! is captured by libtest, unlike writing to the real stdout
        print!("{}", String::from_utf8_lossy(&output.stdout));
        eprint!("{}", String::from_utf8_lossy(&output.stderr));

        Ok(output)
    }
}

/// Write candump lines to a temporary file, one per line
pub fn candump_file<S: AsRef<str>>(lines: &[S]) -> eyre::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    for line in lines {
        writeln!(file, "{}", line.as_ref().trim())?;
    }
    Ok(file)
}

/// Get a command running the given binary from the crate under test, with TRACE logging
///
/// Relies on the `CARGO_BIN_EXE_<name>` variable cargo sets for integration tests.
#[macro_export]
macro_rules! tool {
    ($name:literal) => {{
        let mut cmd = $crate::Command::new(env!(concat!("CARGO_BIN_EXE_", $name)));
        cmd.arg("--log-level=TRACE");
        cmd
    }};
}
