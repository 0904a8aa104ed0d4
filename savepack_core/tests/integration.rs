//! Container-level tests: full write → finalize → open → read cycles over
//! in-memory and file-backed streams.
use std::io::{self, Write};
use std::sync::Arc;

use proptest::prelude::*;
use savepack_codecs::codec_by_id;
use savepack_core::{
    Codec, Compression, Container, ContainerOptions, Error, FormatError, Header, IntegrityWarning,
    Mode, CHUNK_ENTRY_SIZE, HEADER_SIZE,
};

// ── helpers ───────────────────────────────────────────────────────────────

fn options(compression: Compression) -> ContainerOptions {
    ContainerOptions {
        compression,
        ..ContainerOptions::default()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Sample {
    tick: u64,
    cash: i32,
    rating: u16,
    open: bool,
    name: String,
    prices: Vec<u32>,
    queues: Vec<Vec<u8>>,
    slots: [u16; 4],
}

impl Sample {
    fn populated() -> Self {
        Self {
            tick: 0x0123_4567_89AB_CDEF,
            cash: -25_000,
            rating: 999,
            open: true,
            name: "Forest Frontiers".to_string(),
            prices: vec![150, 200, 0, 4_000_000],
            queues: vec![vec![1, 2, 3], vec![], vec![9; 40]],
            slots: [7, 0, 11, 0],
        }
    }
}

/// One schema function for both directions.
fn visit_sample(c: &mut savepack_core::Cursor<'_>, s: &mut Sample) -> savepack_core::Result<()> {
    c.read_write(&mut s.tick)?;
    c.read_write(&mut s.cash)?;
    c.read_write(&mut s.rating)?;
    c.read_write(&mut s.open)?;
    c.read_write_string(&mut s.name)?;
    c.read_write_vec(&mut s.prices, |c, p| c.read_write(p))?;
    c.read_write_vec(&mut s.queues, |c, q| c.read_write_vec(q, |c, b| c.read_write(b)))?;
    // zero slots are not stored; on read they come back as the default
    c.read_write_array(&mut s.slots, |c, slot| {
        if *slot == 0 && c.mode() == Mode::Writing {
            return Ok(false);
        }
        c.read_write(slot)?;
        Ok(true)
    })
}

fn write_sample(compression: Compression) -> Vec<u8> {
    encode_sample(Sample::populated(), compression)
}

fn encode_sample(mut sample: Sample, compression: Compression) -> Vec<u8> {
    let mut out = Vec::new();
    Container::write_with(&mut out, options(compression), codec_by_id, |c| {
        c.read_write_chunk(1, |cursor| visit_sample(cursor, &mut sample))?;
        Ok(())
    })
    .unwrap();
    out
}

fn read_sample(bytes: &[u8]) -> Sample {
    let mut container = Container::open(bytes, ContainerOptions::default(), codec_by_id).unwrap();
    assert!(container.warnings().is_empty(), "{:?}", container.warnings());
    let mut sample = Sample::default();
    assert!(container
        .read_write_chunk(1, |cursor| visit_sample(cursor, &mut sample))
        .unwrap());
    sample
}

fn header_of(bytes: &[u8]) -> Header {
    let mut buf = [0u8; HEADER_SIZE];
    buf.copy_from_slice(&bytes[..HEADER_SIZE]);
    Header::from_bytes(&buf)
}

/// Stored slots are compacted to the front of the array on read.
fn expected_after_read() -> Sample {
    Sample {
        slots: [7, 11, 0, 0],
        ..Sample::populated()
    }
}

// ── round trips ────────────────────────────────────────────────────────────

#[test]
fn round_trip_gzip() {
    let bytes = write_sample(Compression::Gzip);
    let header = header_of(&bytes);
    assert_eq!(header.compression().unwrap(), Compression::Gzip);
    assert_eq!(header.num_chunks, 1);
    assert_eq!(
        bytes.len() as u64,
        (HEADER_SIZE + CHUNK_ENTRY_SIZE) as u64 + header.compressed_size
    );
    assert_eq!(read_sample(&bytes), expected_after_read());
}

#[test]
fn round_trip_uncompressed() {
    let bytes = write_sample(Compression::None);
    let header = header_of(&bytes);
    assert_eq!(header.compression().unwrap(), Compression::None);
    assert_eq!(header.compressed_size, header.uncompressed_size);
    assert_eq!(read_sample(&bytes), expected_after_read());
}

#[test]
fn file_backed_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("park.sav");

    let file = std::fs::File::create(&path).unwrap();
    let mut sample = Sample::populated();
    let summary = Container::write_with(file, ContainerOptions::default(), codec_by_id, |c| {
        c.read_write_chunk(1, |cursor| visit_sample(cursor, &mut sample))?;
        Ok(())
    })
    .unwrap();
    assert_eq!(summary.compression, Compression::Gzip);
    assert!(summary.fallback.is_none());

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(read_sample(&bytes), expected_after_read());
}

#[test]
fn sha1_matches_payload() {
    let bytes = write_sample(Compression::Gzip);
    let container = Container::open(bytes.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    assert_eq!(container.mode(), Mode::Reading);
    assert!(container.verify_sha1().is_ok());
    assert_eq!(
        container.header().sha1,
        savepack_core::integrity::sha1_digest(container.payload())
    );
}

fn arb_sample() -> impl Strategy<Value = Sample> {
    (
        (any::<u64>(), any::<i32>(), any::<u16>(), any::<bool>()),
        "\\PC{0,24}",
        prop::collection::vec(any::<u32>(), 0..16),
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..12), 0..6),
        any::<[u16; 4]>(),
    )
        .prop_map(|((tick, cash, rating, open), name, prices, queues, slots)| Sample {
            tick,
            cash,
            rating,
            open,
            name,
            prices,
            queues,
            slots,
        })
}

/// Zero slots are skipped on write, so the stored ones come back compacted.
fn compacted(sample: &Sample) -> Sample {
    let mut slots = [0u16; 4];
    for (dst, src) in slots.iter_mut().zip(sample.slots.iter().filter(|&&v| v != 0)) {
        *dst = *src;
    }
    Sample {
        slots,
        ..sample.clone()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_sample_round_trips(sample in arb_sample(), gzip in any::<bool>()) {
        let compression = if gzip { Compression::Gzip } else { Compression::None };
        let bytes = encode_sample(sample.clone(), compression);
        prop_assert_eq!(header_of(&bytes).compression().unwrap(), compression);
        prop_assert_eq!(read_sample(&bytes), compacted(&sample));
    }
}

// ── chunk directory ────────────────────────────────────────────────────────

fn write_ids(ids: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    Container::write_with(&mut out, ContainerOptions::default(), codec_by_id, |c| {
        for &id in ids {
            c.read_write_chunk(id, |cursor| cursor.write(id * 100))?;
        }
        Ok(())
    })
    .unwrap();
    out
}

#[test]
fn chunk_lookup_ignores_write_order() {
    let bytes = write_ids(&[3, 1, 2]);
    let mut container = Container::open(bytes.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    let ids: Vec<u32> = container.chunks().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![3, 1, 2]);

    let mut value = 0u32;
    assert!(container
        .read_write_chunk(1, |c| c.read_write(&mut value))
        .unwrap());
    assert_eq!(value, 100);
    assert_eq!(container.chunk(1).unwrap().offset, 4);
}

#[test]
fn missing_chunk_leaves_destination_alone() {
    let bytes = write_ids(&[1]);
    let mut container = Container::open(bytes.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();

    let mut value = 42u32;
    let mut called = false;
    let found = container
        .read_write_chunk(7, |c| {
            called = true;
            c.read_write(&mut value)
        })
        .unwrap();
    assert!(!found);
    assert!(!called);
    assert_eq!(value, 42);
    assert!(container.chunk_bytes(7).is_none());
}

#[test]
fn duplicate_ids_resolve_to_first() {
    let mut out = Vec::new();
    Container::write_with(&mut out, ContainerOptions::default(), codec_by_id, |c| {
        c.read_write_chunk(5, |cursor| cursor.write(1u8))?;
        c.read_write_chunk(5, |cursor| cursor.write(2u8))?;
        Ok(())
    })
    .unwrap();

    let mut container = Container::open(out.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    assert_eq!(container.chunks().len(), 2);
    let mut value = 0u8;
    container
        .read_write_chunk(5, |c| c.read_write(&mut value))
        .unwrap();
    assert_eq!(value, 1);
    assert_eq!(container.chunk_bytes(5), Some(&[1u8][..]));
}

#[test]
fn failed_chunk_is_rolled_back() {
    let mut out = Vec::new();
    Container::write_with(&mut out, options(Compression::None), codec_by_id, |c| {
        c.read_write_chunk(1, |cursor| cursor.write(0xAAu8))?;
        let err = c
            .read_write_chunk(2, |cursor| {
                cursor.write(0xBBu8)?;
                let mut slots = [1u8];
                cursor.read_write_array(&mut slots, |c, _| {
                    c.write(0u8)?;
                    Ok(false)
                })?;
                // any visitor error aborts the chunk
                Err(savepack_core::FramingError::DataWithoutElements { start: 1, end: 10 }.into())
            })
            .unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
        c.read_write_chunk(3, |cursor| cursor.write(0xCCu8))?;
        Ok(())
    })
    .unwrap();

    let container = Container::open(out.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    assert_eq!(container.payload(), &[0xAA, 0xCC]);
    assert!(container.chunk(2).is_none());
    assert_eq!(container.chunk(3).unwrap().offset, 1);
}

// ── compression fallback ───────────────────────────────────────────────────

struct BrokenGzip;

impl Codec for BrokenGzip {
    fn compression(&self) -> Compression {
        Compression::Gzip
    }

    fn name(&self) -> &'static str {
        "broken"
    }

    fn compress(&self, _raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("deflate stream error")
    }

    fn decompress(&self, _compressed: &[u8], _expected_len: usize) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("inflate stream error")
    }
}

fn broken_gzip_resolver(compression: Compression) -> anyhow::Result<Arc<dyn Codec>> {
    match compression {
        Compression::Gzip => Ok(Arc::new(BrokenGzip)),
        other => codec_by_id(other),
    }
}

#[test]
fn compression_failure_falls_back_to_raw() {
    let mut out = Vec::new();
    let summary = Container::write_with(&mut out, ContainerOptions::default(), broken_gzip_resolver, |c| {
        c.read_write_chunk(1, |cursor| cursor.write_str("still readable"))?;
        Ok(())
    })
    .unwrap();
    assert_eq!(summary.compression, Compression::None);
    assert!(summary.fallback.unwrap().contains("deflate stream error"));

    let header = header_of(&out);
    assert_eq!(header.compression().unwrap(), Compression::None);
    assert_eq!(header.compressed_size, header.uncompressed_size);

    let mut container = Container::open(out.as_slice(), ContainerOptions::default(), broken_gzip_resolver).unwrap();
    let mut s = String::new();
    container
        .read_write_chunk(1, |c| c.read_write_string(&mut s))
        .unwrap();
    assert_eq!(s, "still readable");
}

#[test]
fn inflate_failure_is_fatal() {
    let bytes = write_sample(Compression::Gzip);
    let result = Container::open(bytes.as_slice(), ContainerOptions::default(), broken_gzip_resolver);
    assert!(matches!(result, Err(Error::Codec(_))));
}

// ── integrity ──────────────────────────────────────────────────────────────

#[test]
fn declared_size_mismatch_is_a_warning() {
    let mut bytes = write_sample(Compression::Gzip);
    let mut header = header_of(&bytes);
    let actual = header.uncompressed_size;
    header.uncompressed_size += 5;
    bytes[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

    let container = Container::open(bytes.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    assert_eq!(
        container.warnings(),
        &[IntegrityWarning::SizeMismatch {
            declared: actual + 5,
            actual,
        }]
    );
}

#[test]
fn tampered_payload_fails_sha1() {
    let mut bytes = write_sample(Compression::None);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let container = Container::open(bytes.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    assert!(container.warnings().is_empty());
    assert!(matches!(
        container.verify_sha1(),
        Err(IntegrityWarning::HashMismatch { .. })
    ));

    let eager = ContainerOptions {
        verify_sha1_on_open: true,
        ..ContainerOptions::default()
    };
    let container = Container::open(bytes.as_slice(), eager, codec_by_id).unwrap();
    assert!(matches!(
        container.warnings(),
        [IntegrityWarning::HashMismatch { .. }]
    ));
}

#[test]
fn chunk_past_payload_is_flagged() {
    let mut bytes = write_ids(&[1]);
    let header = header_of(&bytes);
    assert_eq!(header.compression().unwrap(), Compression::Gzip);
    // entry length lives at bytes 12..20 of the first directory entry
    let at = HEADER_SIZE + 12;
    bytes[at..at + 8].copy_from_slice(&1000u64.to_ne_bytes());

    let container = Container::open(bytes.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    assert!(matches!(
        container.warnings(),
        [IntegrityWarning::ChunkOutOfBounds { id: 1, .. }]
    ));
    assert!(container.chunk_bytes(1).is_none());
}

// ── format errors ──────────────────────────────────────────────────────────

#[test]
fn bad_magic_is_rejected() {
    let bytes = write_ids(&[1]);
    let strict = ContainerOptions {
        magic: 0x1234_5678,
        ..ContainerOptions::default()
    };
    let err = Container::open(bytes.as_slice(), strict.clone(), codec_by_id).err().unwrap();
    assert!(matches!(err, Error::Format(FormatError::BadMagic { .. })));

    let lenient = ContainerOptions {
        verify_magic: false,
        ..strict
    };
    assert!(Container::open(bytes.as_slice(), lenient, codec_by_id).is_ok());
}

#[test]
fn newer_min_version_is_rejected() {
    let mut out = Vec::new();
    let writer_options = ContainerOptions {
        target_version: 9,
        min_version: 4,
        ..ContainerOptions::default()
    };
    Container::write_with(&mut out, writer_options, codec_by_id, |_| Ok(())).unwrap();

    let old_reader = ContainerOptions {
        target_version: 3,
        ..ContainerOptions::default()
    };
    let err = Container::open(out.as_slice(), old_reader, codec_by_id).err().unwrap();
    assert!(matches!(
        err,
        Error::Format(FormatError::UnsupportedVersion {
            min_version: 4,
            reader_version: 3
        })
    ));

    let header = header_of(&out);
    assert_eq!((header.target_version, header.min_version), (9, 4));
}

#[test]
fn unknown_compression_is_rejected() {
    let mut bytes = write_ids(&[1]);
    let mut header = header_of(&bytes);
    header.compression = 7;
    bytes[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

    let err = Container::open(bytes.as_slice(), ContainerOptions::default(), codec_by_id).err().unwrap();
    assert!(matches!(
        err,
        Error::Format(FormatError::UnknownCompression(7))
    ));
}

#[test]
fn truncated_stream_is_io_error() {
    let bytes = write_sample(Compression::Gzip);
    for cut in [10, HEADER_SIZE + 3, bytes.len() - 1] {
        let err = Container::open(&bytes[..cut], ContainerOptions::default(), codec_by_id).err().unwrap();
        assert!(matches!(err, Error::Io(_)), "cut at {cut}: {err}");
    }
}

// ── lifecycle ──────────────────────────────────────────────────────────────

#[test]
fn empty_container_is_valid() {
    let mut out = Vec::new();
    let summary = Container::write_with(&mut out, ContainerOptions::default(), codec_by_id, |_| Ok(())).unwrap();
    assert_eq!(summary.num_chunks, 0);
    assert_eq!(summary.uncompressed_size, 0);

    let mut container = Container::open(out.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    assert!(container.chunks().is_empty());
    assert!(container.verify_sha1().is_ok());
    assert!(!container.read_write_chunk(0, |_| Ok(())).unwrap());
}

#[test]
fn drop_finalizes_unfinished_container() {
    let mut out = Vec::new();
    {
        let mut container = Container::create(&mut out, ContainerOptions::default(), codec_by_id);
        container
            .read_write_chunk(4, |c| c.write_str("written before an early return"))
            .unwrap();
    }
    let container = Container::open(out.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    assert_eq!(container.chunks().len(), 1);
    assert!(container.verify_sha1().is_ok());
}

#[test]
fn write_with_finalizes_after_failure() {
    let mut out = Vec::new();
    let result = Container::write_with(&mut out, ContainerOptions::default(), codec_by_id, |c| {
        c.read_write_chunk(1, |cursor| cursor.write(1u32))?;
        Err(Error::Io(io::Error::new(io::ErrorKind::Other, "caller gave up")))
    });
    assert!(matches!(result, Err(Error::Io(_))));

    let container = Container::open(out.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    assert_eq!(container.chunk_bytes(1), Some(&1u32.to_ne_bytes()[..]));
}

/// Accepts `limit` bytes, then fails every write.
struct FailingSink {
    limit: usize,
    written: usize,
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written >= self.limit {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        let n = buf.len().min(self.limit - self.written);
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn sink_failure_during_finish_is_reported() {
    let sink = FailingSink {
        limit: HEADER_SIZE + 4,
        written: 0,
    };
    let mut container = Container::create(sink, ContainerOptions::default(), codec_by_id);
    container
        .read_write_chunk(1, |c| c.write(7u64))
        .unwrap();
    let err = container.finish().unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn finish_in_read_mode_is_wrong_mode() {
    let bytes = write_ids(&[1]);
    let container = Container::open(bytes.as_slice(), ContainerOptions::default(), codec_by_id).unwrap();
    assert!(matches!(
        container.finish(),
        Err(Error::WrongMode {
            required: Mode::Writing,
            actual: Mode::Reading
        })
    ));
}
