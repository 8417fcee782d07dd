use clap::Parser;
use std::error::Error;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nonblocking::{IoSource, Overflow, Reader};

/// Run a command and print its output as it arrives, through a bounded buffer.
#[derive(Parser, Debug)]
#[command(name = "pipe")]
struct Args {
    /// Maximum number of buffered reads, 0 for no limit
    #[arg(short, long, default_value_t = 0)]
    capacity: usize,
    /// Read line by line instead of in chunks
    #[arg(short, long)]
    lines: bool,
    /// Evict the oldest read instead of dropping the newest
    #[arg(long)]
    drop_oldest: bool,
    /// Milliseconds to wait for buffer space before dropping
    #[arg(long)]
    drop_timeout_ms: Option<u64>,
    /// Milliseconds to sleep after every batch, to emulate a slow consumer
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
    /// Command to run
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn write_batch(reader: &Reader<Vec<u8>>, out: &mut impl Write) -> std::io::Result<usize> {
    let mut n = 0;
    for chunk in reader.try_iter() {
        out.write_all(&chunk)?;
        n += 1;
    }
    out.flush()?;
    Ok(n)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (program, rest) = args.command.split_first().ok_or("missing command")?;

    let mut child = Command::new(program)
        .args(rest)
        .stdout(Stdio::piped())
        .spawn()?;
    let stdout = child.stdout.take().ok_or("child has no stdout")?;
    #[cfg(unix)]
    nonblocking::source::set_nonblocking(&stdout)?;

    let overflow = if args.drop_oldest {
        Overflow::DropOldest
    } else {
        Overflow::DropNewest
    };
    let mut builder = Reader::builder()
        .capacity(args.capacity)
        .lines(args.lines)
        .overflow(overflow);
    if let Some(ms) = args.drop_timeout_ms {
        builder = builder.drop_timeout(Duration::from_millis(ms));
    }
    let mut reader = builder.spawn(IoSource::from_read(stdout))?;

    let started = Instant::now();
    let mut out = std::io::stdout().lock();
    let mut reads = 0;
    while reader.is_pumping() {
        reader.block(Some(Duration::from_millis(500)));
        reads += write_batch(&reader, &mut out)?;
        if args.delay_ms > 0 {
            thread::sleep(Duration::from_millis(args.delay_ms));
        }
    }
    // final batch
    reads += write_batch(&reader, &mut out)?;

    reader.close()?;
    let status = child.wait()?;
    let dropped = reader.dropped();
    info!(
        %status,
        reads,
        dropped = dropped.count,
        dropped_bytes = dropped.bytes,
        reason = ?reader.stop_reason(),
        elapsed = ?started.elapsed(),
        "done"
    );
    Ok(())
}
