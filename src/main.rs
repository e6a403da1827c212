// src/main.rs

//! `keystroke-reader`: prints the keystrokes found in a raw byte stream.
//!
//! Reads stdin (or the file named on the command line) in chunks, the way a
//! connection delivers them, and prints one line per keystroke.
//!
//! ```text
//! keystroke-reader [--csi <hex>] [--config <file.json>] [--json] [input-file]
//! ```

use anyhow::{bail, Context};
use keystroke_stream::{Keystroke, KeystrokeConfig, KeystrokeStream};
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};

const READ_CHUNK_SIZE: usize = 512;

#[derive(Debug, Default)]
struct Options {
    config: KeystrokeConfig,
    input: Option<String>,
    json: bool,
}

fn parse_options(args: impl Iterator<Item = String>) -> anyhow::Result<Options> {
    let mut options = Options::default();
    let mut csi_override = None;
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--csi" => {
                let value = args.next().context("--csi needs a value")?;
                let digits = value.trim_start_matches("0x");
                let csi = u8::from_str_radix(digits, 16)
                    .with_context(|| format!("Invalid CSI byte '{}'", value))?;
                csi_override = Some(csi);
            }
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file '{}'", path))?;
                options.config = KeystrokeConfig::from_json_str(&json)?;
            }
            "--json" => options.json = true,
            other if other.starts_with("--") => bail!("Unknown option '{}'", other),
            other => {
                if options.input.is_some() {
                    bail!("Only one input file may be given");
                }
                options.input = Some(other.to_string());
            }
        }
    }
    if let Some(csi) = csi_override {
        options.config.csi = csi;
    }
    Ok(options)
}

/// One line per keystroke: `Display` text, or a JSON object with `--json`.
fn write_stroke(out: &mut impl Write, stroke: &Keystroke, json: bool) -> anyhow::Result<()> {
    if json {
        serde_json::to_writer(&mut *out, &stroke.record()).context("Failed to encode keystroke")?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", stroke)?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let options = parse_options(std::env::args().skip(1))?;
    info!("Using {:?}", options.config);

    let mut reader: Box<dyn Read> = match &options.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("Failed to open input '{}'", path))?,
        ),
        None => Box::new(io::stdin()),
    };
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut stream = KeystrokeStream::with_config(&options.config);
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut total = 0usize;
    loop {
        let n = reader.read(&mut chunk).context("Failed to read input")?;
        if n == 0 {
            break;
        }
        total += n;
        stream.feed(&chunk[..n]);
        for stroke in stream.drain() {
            write_stroke(&mut out, &stroke, options.json)?;
        }
    }

    stream.feed_eof();
    for stroke in stream.drain() {
        write_stroke(&mut out, &stroke, options.json)?;
    }
    out.flush().context("Failed to flush output")?;

    info!("Read {} bytes, stream at EOF: {}", total, stream.is_eof());
    Ok(())
}
