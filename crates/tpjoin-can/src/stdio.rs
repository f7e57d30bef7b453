use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use eyre::WrapErr;

fn is_stdio(path: Option<&Path>) -> bool {
    path.is_none_or(|p| p.as_os_str() == "-")
}

/// Get a buffered reader for the given path; stdin if `-` or `None`
pub fn get_input_reader(input: Option<&Path>) -> eyre::Result<Box<dyn BufRead>> {
    match input {
        Some(path) if !is_stdio(input) => {
            let file = File::open(path).wrap_err(format!("Failed to open input file: {path:?}"))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(std::io::stdin().lock())),
    }
}

/// Get a buffered writer for the given path; stdout if `-` or `None`
pub fn get_output_writer(output: Option<&Path>) -> eyre::Result<Box<dyn Write>> {
    match output {
        Some(path) if !is_stdio(output) => {
            let file =
                File::create(path).wrap_err(format!("Failed to create output file: {path:?}"))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        _ => Ok(Box::new(BufWriter::new(std::io::stdout()))),
    }
}
