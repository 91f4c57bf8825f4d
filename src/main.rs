//! Command-line renderer: replay an IMF song or register dump through the
//! emulated chip and write the result to a stereo WAV file.

use std::env;
use std::process::ExitCode;

use anyhow::{bail, Context};

use ymf262::replayer::{load_file, Replayer, StreamFormat, TimingConfig};
use ymf262::{write_wav, NATIVE_SAMPLE_RATE};

struct Args {
    input: String,
    output: String,
    imf_rate: u32,
    format: Option<StreamFormat>,
}

fn print_usage() {
    eprintln!("Usage: ymf262 <song.imf|song.wlf|dump.bin> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o <file>        Output WAV path (default: out.wav)");
    eprintln!("  --rate <hz>      IMF command rate (default: 560; Wolfenstein rips use 700)");
    eprintln!("  --format <fmt>   Force input format: imf or regdump");
}

fn parse_args() -> anyhow::Result<Args> {
    let mut input = None;
    let mut output = "out.wav".to_string();
    let mut imf_rate = TimingConfig::default().imf_rate;
    let mut format = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" => {
                output = args.next().context("-o needs a file path")?;
            }
            "--rate" => {
                let value = args.next().context("--rate needs a value in Hz")?;
                imf_rate = value
                    .parse()
                    .with_context(|| format!("bad --rate value: {value}"))?;
            }
            "--format" => match args.next().as_deref() {
                Some("imf") => format = Some(StreamFormat::Imf),
                Some("regdump") => format = Some(StreamFormat::Regdump),
                other => bail!("bad --format value: {other:?} (expected imf or regdump)"),
            },
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            _ if input.is_none() => input = Some(arg),
            _ => bail!("unexpected argument: {arg}"),
        }
    }

    let input = input.context("no input file given")?;
    Ok(Args {
        input,
        output,
        imf_rate,
        format,
    })
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    let config = TimingConfig {
        imf_rate: args.imf_rate,
    };

    let mut replayer = match args.format {
        Some(format) => {
            let data = std::fs::read(&args.input)
                .with_context(|| format!("reading {}", args.input))?;
            Replayer::load(&data, format, config)?
        }
        None => load_file(&args.input, config)?,
    };

    println!(
        "Rendering {} as {} at {} Hz...",
        args.input,
        replayer.stream_name(),
        NATIVE_SAMPLE_RATE
    );
    let frames = replayer.render_to_end();
    let seconds = frames.len() as f32 / NATIVE_SAMPLE_RATE as f32;
    println!("Rendered {} frames ({seconds:.1}s)", frames.len());

    write_wav(&args.output, &frames)?;
    println!("Wrote {}", args.output);
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            print_usage();
            ExitCode::FAILURE
        }
    }
}
