use std::fs::File;
use std::io::{self, BufReader, Write};
#[cfg(unix)]
use std::mem::ManuallyDrop;
#[cfg(unix)]
use std::os::unix::io::FromRawFd;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use base64plus::base64::{decode_stream, encode_stream};
use base64plus::common::TOOL_NAME;
use base64plus::common::io::stdin_regular_file;
use base64plus::common::io_error_msg;
use base64plus::common::name::{NameSource, PathName, StdinLink, base_name, resolve_name};
use base64plus::frame::{
    DecodeReport, EncodeOptions, create_target, decode_framed, encode_framed,
    encode_framed_seekable,
};
use base64plus::wrap::DEFAULT_WRAP_COL;

#[derive(Parser)]
#[command(
    name = "fbase64plus",
    about = "Base64 encode FILE, or standard input, with a filename/size/SHA-256 header.",
    after_help = "With no FILE, or when FILE is -, read standard input.\n\n\
        Encoded output starts with four lines: the file name, its size in bytes,\n\
        its SHA-256 digest in hex, and a blank line. Decoding writes the file\n\
        named in the header into the current directory and reports on standard\n\
        error whether the decoded bytes match the recorded digest.\n\
        Use --legacy for plain wrapped base64 without a header.",
    version
)]
struct Cli {
    /// Decode data
    #[arg(short = 'd', long = "decode")]
    decode: bool,

    /// Legacy mode: no header, no digest, output to stdout
    #[arg(short = 'l', long = "legacy")]
    legacy: bool,

    /// Wrap encoded lines after COLS characters. Use 0 to disable wrapping
    #[arg(
        short = 'w',
        long = "wrap",
        value_name = "COLS",
        default_value_t = DEFAULT_WRAP_COL
    )]
    wrap: usize,

    /// Name recorded in the header instead of the input's own name
    #[arg(short = 'n', long = "name", value_name = "NAME")]
    name: Option<String>,

    /// Diagnostic log filter (e.g. debug, base64plus=trace)
    #[arg(
        long = "log-level",
        value_name = "FILTER",
        env = "FBASE64PLUS_LOG",
        default_value = "warn"
    )]
    log_level: String,

    /// File to process (reads stdin if omitted or -)
    file: Option<PathBuf>,
}

/// Raw fd stdout on Unix. The codec's line writer already batches output
/// into 2MB writes, so the StdoutLock buffer would only add a copy.
#[cfg(unix)]
#[inline]
fn raw_stdout() -> ManuallyDrop<File> {
    unsafe { ManuallyDrop::new(File::from_raw_fd(1)) }
}

/// Enlarge pipe buffers on Linux for higher throughput.
#[cfg(target_os = "linux")]
fn enlarge_pipes() {
    const PIPE_SIZE: i32 = 8 * 1024 * 1024;
    unsafe {
        libc::fcntl(0, libc::F_SETPIPE_SZ, PIPE_SIZE); // stdin
        libc::fcntl(1, libc::F_SETPIPE_SZ, PIPE_SIZE); // stdout
    }
}

fn init_logging(filter: &str) {
    let env_filter = EnvFilter::try_new(filter)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .without_time()
        .try_init();
}

fn main() {
    base64plus::common::reset_sigpipe();

    #[cfg(target_os = "linux")]
    enlarge_pipes();

    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let input = cli.file.as_deref().filter(|p| *p != Path::new("-"));

    #[cfg(unix)]
    let mut raw = raw_stdout();
    #[cfg(unix)]
    let out: &mut File = &mut raw;
    #[cfg(not(unix))]
    let stdout = io::stdout();
    #[cfg(not(unix))]
    let out = &mut stdout.lock();

    let result = match (cli.decode, cli.legacy) {
        (false, false) => encode_framed_cmd(&cli, input, out),
        (false, true) => encode_legacy_cmd(&cli, input, out),
        (true, false) => decode_framed_cmd(input),
        (true, true) => decode_legacy_cmd(input, out),
    };

    if let Err(e) = result {
        let broken_pipe = e
            .downcast_ref::<base64plus::Error>()
            .is_some_and(base64plus::Error::is_broken_pipe);
        if broken_pipe {
            process::exit(0);
        }
        eprintln!("{}: {:#}", TOOL_NAME, e);
        process::exit(1);
    }
}

fn open_input(path: &Path) -> anyhow::Result<File> {
    File::open(path)
        .map_err(base64plus::Error::from)
        .with_context(|| path.display().to_string())
}

fn encode_framed_cmd(cli: &Cli, input: Option<&Path>, out: &mut impl Write) -> anyhow::Result<()> {
    let opts = EncodeOptions { wrap_col: cli.wrap };
    let given = || cli.name.as_deref().and_then(|n| base_name(Path::new(n)));

    match input {
        Some(path) => {
            let path_name = PathName(path.to_path_buf());
            let name = resolve_name(&[&given as &dyn NameSource, &path_name]);
            let mut file = open_input(path)?;
            encode_framed_seekable(&mut file, out, &name, &opts)
                .context("encoding")?;
        }
        None => {
            let name = resolve_name(&[&given as &dyn NameSource, &StdinLink]);
            if let Some(mut file) = stdin_regular_file() {
                encode_framed_seekable(&mut *file, out, &name, &opts)
                    .context("encoding")?;
            } else {
                let stdin = io::stdin();
                encode_framed(&mut stdin.lock(), out, &name, &opts)
                    .context("encoding")?;
            }
        }
    }
    Ok(())
}

fn encode_legacy_cmd(cli: &Cli, input: Option<&Path>, out: &mut impl Write) -> anyhow::Result<()> {
    match input {
        Some(path) => {
            encode_stream(&mut open_input(path)?, out, cli.wrap)
                .context("encoding")?;
        }
        None => {
            encode_stream(&mut io::stdin().lock(), out, cli.wrap)
                .context("encoding")?;
        }
    }
    Ok(())
}

fn decode_framed_cmd(input: Option<&Path>) -> anyhow::Result<()> {
    let open = |header: &base64plus::frame::Header| {
        create_target(Path::new("."), header).map_err(|e| match e {
            base64plus::Error::Io(io) => base64plus::Error::Io(io::Error::new(
                io.kind(),
                format!("{}: {}", header.filename, io_error_msg(&io)),
            )),
            other => other,
        })
    };
    let report = match input {
        Some(path) => decode_framed(open_input(path)?, open),
        None => decode_framed(io::stdin().lock(), open),
    }
    .context("decoding")?;
    print_report(&report)?;
    Ok(())
}

fn print_report(report: &DecodeReport) -> io::Result<()> {
    let stderr = io::stderr();
    let mut err = stderr.lock();
    writeln!(err, "Original size: {} bytes", report.reported_size())?;
    writeln!(err, "SHA256: {}", report.computed_digest_hex())?;
    writeln!(err, "Matches original: {}", report.matches())?;
    Ok(())
}

fn decode_legacy_cmd(input: Option<&Path>, out: &mut impl Write) -> anyhow::Result<()> {
    match input {
        Some(path) => {
            let mut reader = BufReader::new(open_input(path)?);
            decode_stream(&mut reader, out).context("decoding")?;
        }
        None => {
            decode_stream(&mut io::stdin().lock(), out)
                .context("decoding")?;
        }
    }
    Ok(())
}
