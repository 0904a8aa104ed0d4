use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use savepack_codecs::codec_by_id;
use savepack_core::integrity::to_hex;
use savepack_core::{Compression, Container, ContainerOptions};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "savepack",
    about = "Inspect, verify, extract and repack chunked save containers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print header metadata and chunk directory statistics
    Inspect {
        /// Container file to inspect
        file: PathBuf,
        /// Print per-chunk details
        #[arg(long)]
        chunks: bool,
    },
    /// Check the payload size and SHA-1 against the header
    Verify {
        /// Container file to verify
        file: PathBuf,
    },
    /// Dump the raw bytes of a single chunk
    Extract {
        /// Container file
        file: PathBuf,
        /// Chunk id (first match in the directory)
        #[arg(short, long)]
        id: u32,
        /// Write raw bytes to a file instead of printing a hex dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Copy every chunk into a new container with a different compression
    Repack {
        /// Source container
        input: PathBuf,
        /// Destination container
        output: PathBuf,
        /// Payload compression for the destination
        #[arg(short, long, value_enum, default_value_t = CompressionArg::Gzip)]
        compression: CompressionArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CompressionArg {
    None,
    Gzip,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => Compression::None,
            CompressionArg::Gzip => Compression::Gzip,
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Options that accept any magic and any version, for tooling that only
/// looks at the container.
fn inspection_options() -> ContainerOptions {
    ContainerOptions {
        verify_magic: false,
        target_version: u32::MAX,
        ..ContainerOptions::default()
    }
}

fn open_file(path: &Path) -> anyhow::Result<Container<'static>> {
    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let container = Container::open(BufReader::new(file), inspection_options(), codec_by_id)
        .with_context(|| format!("reading container {:?}", path))?;
    Ok(container)
}

fn magic_text(magic: u32) -> String {
    magic
        .to_ne_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
        .collect()
}

fn compression_text(raw: u32) -> String {
    match Compression::try_from(raw) {
        Ok(c) => format!("{} (id={})", c.name(), raw),
        Err(_) => format!("unknown (id={})", raw),
    }
}

/// Binary-prefixed size, e.g. `1536` -> `1.50 KiB`.
fn human_bytes(n: u64) -> String {
    const SCALES: [(u64, &str); 4] = [(1 << 40, "TiB"), (1 << 30, "GiB"), (1 << 20, "MiB"), (1 << 10, "KiB")];
    SCALES
        .iter()
        .find(|(scale, _)| n >= *scale)
        .map(|&(scale, unit)| format!("{:.2} {}", n as f64 / scale as f64, unit))
        .unwrap_or_else(|| format!("{} B", n))
}

fn print_hex_dump(bytes: &[u8], limit: usize) {
    let preview = &bytes[..bytes.len().min(limit)];
    for (i, row) in preview.chunks(16).enumerate() {
        print!("  {:04x}  ", i * 16);
        for b in row {
            print!("{:02x} ", b);
        }
        for _ in row.len()..16 {
            print!("   ");
        }
        print!("  |");
        for b in row {
            if b.is_ascii_graphic() || *b == b' ' {
                print!("{}", *b as char);
            } else {
                print!(".");
            }
        }
        println!("|");
    }
    if bytes.len() > limit {
        println!("  ... ({} bytes remaining not shown)", bytes.len() - limit);
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_inspect(file: PathBuf, show_chunks: bool) -> anyhow::Result<()> {
    let container = open_file(&file)?;
    let header = container.header();
    let file_size = std::fs::metadata(&file)?.len();
    let ratio = if header.compressed_size == 0 {
        1.0
    } else {
        header.uncompressed_size as f64 / header.compressed_size as f64
    };

    println!("=== Container: {:?} ===", file);
    println!();
    println!("  magic          : {:#010x} ({})", header.magic, magic_text(header.magic));
    println!("  target version : {}", header.target_version);
    println!("  min version    : {}", header.min_version);
    println!("  compression    : {}", compression_text(header.compression));
    println!("  chunks         : {}", header.num_chunks);
    println!("  uncompressed   : {}", human_bytes(header.uncompressed_size));
    println!("  compressed     : {}", human_bytes(header.compressed_size));
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  ratio          : {:.2}x", ratio);
    println!("  sha1           : {}", to_hex(&header.sha1));

    for warning in container.warnings() {
        println!("  warning        : {}", warning);
    }

    if show_chunks {
        println!();
        println!("  {:>6}  {:>10}  {:>14}  {:>12}", "#", "id", "offset", "length");
        println!("  {}", "-".repeat(48));
        for (i, e) in container.chunks().iter().enumerate() {
            println!(
                "  {:>6}  {:>10}  {:>14}  {:>12}",
                i,
                e.id,
                e.offset,
                human_bytes(e.length)
            );
        }
    }

    Ok(())
}

fn run_verify(file: PathBuf) -> anyhow::Result<()> {
    let container = open_file(&file)?;
    let mut problems: Vec<String> = container.warnings().iter().map(|w| w.to_string()).collect();
    if let Err(mismatch) = container.verify_sha1() {
        problems.push(mismatch.to_string());
    }

    if problems.is_empty() {
        println!(
            "{:?}: ok ({} chunks, {}, sha1 {})",
            file,
            container.chunks().len(),
            human_bytes(container.payload().len() as u64),
            to_hex(&container.header().sha1)
        );
        return Ok(());
    }
    for problem in &problems {
        eprintln!("  {}", problem);
    }
    anyhow::bail!("{:?} failed verification with {} problem(s)", file, problems.len())
}

fn run_extract(file: PathBuf, id: u32, output: Option<PathBuf>) -> anyhow::Result<()> {
    let container = open_file(&file)?;
    let entry = container
        .chunk(id)
        .ok_or_else(|| anyhow::anyhow!("chunk {} not found in {:?}", id, file))?;
    let bytes = container
        .chunk_bytes(id)
        .ok_or_else(|| anyhow::anyhow!("chunk {} lies outside the payload", id))?;

    eprintln!(
        "chunk {} at payload offset {} ({})",
        id,
        entry.offset,
        human_bytes(entry.length)
    );

    match output {
        Some(path) => {
            std::fs::write(&path, bytes)?;
            eprintln!("  written to {:?}", path);
        }
        None => {
            println!("--- chunk {} ({} bytes) ---", id, bytes.len());
            print_hex_dump(bytes, 256);
        }
    }
    Ok(())
}

fn run_repack(input: PathBuf, output: PathBuf, compression: Compression) -> anyhow::Result<()> {
    let source = open_file(&input)?;
    let header = source.header();
    let options = ContainerOptions {
        magic: header.magic,
        target_version: header.target_version,
        min_version: header.min_version,
        compression,
        ..ContainerOptions::default()
    };

    // Slice by entry rather than by id so duplicate ids are copied faithfully.
    let mut chunks = Vec::with_capacity(source.chunks().len());
    for entry in source.chunks() {
        let bytes = usize::try_from(entry.offset)
            .ok()
            .zip(usize::try_from(entry.end()).ok())
            .and_then(|(start, end)| source.payload().get(start..end))
            .ok_or_else(|| anyhow::anyhow!("chunk {} lies outside the payload", entry.id))?;
        chunks.push((entry.id, bytes.to_vec()));
    }

    let t0 = Instant::now();
    let sink = BufWriter::new(
        File::create(&output).with_context(|| format!("creating output file {:?}", output))?,
    );
    let summary = Container::write_with(sink, options, codec_by_id, |dest| {
        for (id, bytes) in &mut chunks {
            dest.read_write_chunk(*id, |cursor| cursor.read_write_bytes(bytes))?;
        }
        Ok(())
    })
    .with_context(|| format!("writing {:?}", output))?;

    info!(chunks = summary.num_chunks, "repacked container");
    if let Some(reason) = &summary.fallback {
        eprintln!("  compression failed, stored uncompressed: {}", reason);
    }
    eprintln!("  compression : {}", summary.compression.name());
    eprintln!("  chunks      : {}", summary.num_chunks);
    eprintln!("  uncompressed: {}", human_bytes(summary.uncompressed_size));
    eprintln!("  compressed  : {}", human_bytes(summary.compressed_size));
    eprintln!("  elapsed     : {:.3}s", t0.elapsed().as_secs_f64());
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect { file, chunks } => run_inspect(file, chunks),
        Commands::Verify { file } => run_verify(file),
        Commands::Extract { file, id, output } => run_extract(file, id, output),
        Commands::Repack {
            input,
            output,
            compression,
        } => run_repack(input, output, compression.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::human_bytes;

    #[test]
    fn human_bytes_picks_largest_unit() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1536), "1.50 KiB");
        assert_eq!(human_bytes(5 << 30), "5.00 GiB");
    }
}
