use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, bail};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut input_path: Option<String> = None;

    if let Some(arg) = args.next() {
        input_path = Some(arg);
        if args.next().is_some() {
            bail!("Only one input file is supported");
        }
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let output = echoscript::run(&source)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
