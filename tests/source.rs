use std::io::{self, BufReader, Cursor, Read};

use nonblocking::{Chunk, IoSource, Reader, StreamSource};

#[test]
fn chunks_capped_at_hint() {
    let mut s = IoSource::new(Cursor::new(b"hello world".to_vec()));
    assert_eq!(s.read(Some(4)).unwrap(), Chunk::Data(b"hell".to_vec()));
    assert_eq!(s.read(None).unwrap(), Chunk::Data(b"o world".to_vec()));
    assert_eq!(s.read(None).unwrap(), Chunk::Eof);
}

#[test]
fn lines() {
    let mut s = IoSource::new(Cursor::new(b"one\ntwo\nthree".to_vec()));
    assert_eq!(s.read_line(None).unwrap(), Chunk::Data(b"one\n".to_vec()));
    assert_eq!(s.read_line(None).unwrap(), Chunk::Data(b"two\n".to_vec()));
    assert_eq!(s.read_line(None).unwrap(), Chunk::Data(b"three".to_vec()));
    assert_eq!(s.read_line(None).unwrap(), Chunk::Eof);
}

#[test]
fn close_drops_reader() {
    let mut s = IoSource::new(Cursor::new(b"data".to_vec()));
    assert!(!s.is_closed());
    s.close().unwrap();
    assert!(s.is_closed());
    assert!(s.get_ref().is_none());
    assert_eq!(s.read(None).unwrap(), Chunk::Eof);
    assert_eq!(s.read_line(None).unwrap(), Chunk::Eof);
}

#[test]
fn long_lines_split_at_hint() {
    let mut s = IoSource::new(Cursor::new(b"abcdefghij\nxy\n".to_vec()));
    assert_eq!(s.read_line(Some(4)).unwrap(), Chunk::Data(b"abcd".to_vec()));
    assert_eq!(s.read_line(Some(4)).unwrap(), Chunk::Data(b"efgh".to_vec()));
    assert_eq!(s.read_line(Some(4)).unwrap(), Chunk::Data(b"ij\n".to_vec()));
    assert_eq!(s.read_line(Some(4)).unwrap(), Chunk::Data(b"xy\n".to_vec()));
    assert_eq!(s.read_line(Some(4)).unwrap(), Chunk::Eof);
}

/// Yields its parts one read at a time, `None` being a `WouldBlock`.
struct Stutter(Vec<Option<&'static [u8]>>);

impl Read for Stutter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.0.is_empty() {
            return Ok(0);
        }
        match self.0.remove(0) {
            Some(part) => {
                buf[..part.len()].copy_from_slice(part);
                Ok(part.len())
            }
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

#[test]
fn line_survives_would_block() {
    let mut s = IoSource::new(BufReader::new(Stutter(vec![
        Some(b"par"),
        None,
        Some(b"tial\nnext"),
        None,
    ])));

    let e = s.read_line(None).unwrap_err();
    assert_eq!(e.kind(), io::ErrorKind::WouldBlock);
    assert_eq!(s.read_line(None).unwrap(), Chunk::Data(b"partial\n".to_vec()));
    assert_eq!(
        s.read_line(None).unwrap_err().kind(),
        io::ErrorKind::WouldBlock
    );
    assert_eq!(s.read_line(None).unwrap(), Chunk::Data(b"next".to_vec()));
    assert_eq!(s.read_line(None).unwrap(), Chunk::Eof);
}

#[test]
fn line_hint_counts_carried_bytes() {
    let mut s = IoSource::new(BufReader::new(Stutter(vec![
        Some(b"ab"),
        None,
        Some(b"cdef\n"),
    ])));

    assert_eq!(
        s.read_line(Some(4)).unwrap_err().kind(),
        io::ErrorKind::WouldBlock
    );
    assert_eq!(s.read_line(Some(4)).unwrap(), Chunk::Data(b"abcd".to_vec()));
    assert_eq!(s.read_line(Some(4)).unwrap(), Chunk::Data(b"ef\n".to_vec()));
    assert_eq!(s.read_line(Some(4)).unwrap(), Chunk::Eof);
}

#[test]
fn pump_lines_capped_by_chunk_size() {
    let reader = Reader::builder()
        .lines(true)
        .chunk_size(4)
        .spawn(IoSource::new(Cursor::new(b"abcdefghij\n".to_vec())))
        .unwrap();

    let lines: Vec<Vec<u8>> = reader.iter().collect();
    assert_eq!(lines, vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij\n".to_vec()]);
}

#[test]
fn pump_lines_from_stuttering_reader() {
    let source = IoSource::new(BufReader::new(Stutter(vec![
        Some(b"a\nb"),
        None,
        Some(b"\n"),
        None,
        Some(b"c\n"),
    ])));
    let reader = Reader::builder().lines(true).spawn(source).unwrap();

    let lines: Vec<Vec<u8>> = reader.iter().collect();
    assert_eq!(lines, vec![b"a\n".to_vec(), b"b\n".to_vec(), b"c\n".to_vec()]);
    assert!(reader.failure().is_none());
}

#[test]
fn pump_chunks() {
    let data: Vec<u8> = (0..=255).cycle().take(10_000).collect();
    let reader = Reader::builder()
        .chunk_size(1000)
        .spawn(IoSource::from_read(Cursor::new(data.clone())))
        .unwrap();

    let chunks: Vec<Vec<u8>> = reader.iter().collect();
    assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= 1000));
    assert_eq!(chunks.concat(), data);
}

#[cfg(unix)]
mod unix {
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::{Duration, Instant};

    use nonblocking::source::set_nonblocking;
    use nonblocking::{IoSource, Reader, StopReason};

    #[test]
    fn nonblocking_pipe() {
        let (mut tx, rx) = UnixStream::pair().unwrap();
        set_nonblocking(&rx).unwrap();
        let reader = Reader::builder()
            .lines(true)
            .spawn(IoSource::from_read(rx))
            .unwrap();

        let writer = thread::spawn(move || {
            tx.write_all(b"a\nb").unwrap();
            thread::sleep(Duration::from_millis(50));
            tx.write_all(b"\nc\n").unwrap();
        });

        let lines: Vec<Vec<u8>> = reader.iter().collect();
        writer.join().unwrap();
        assert_eq!(lines, vec![b"a\n".to_vec(), b"b\n".to_vec(), b"c\n".to_vec()]);
        assert!(matches!(reader.stop_reason(), Some(StopReason::EndOfStream)));
    }

    #[test]
    fn close_idle_pipe() {
        let (_tx, rx) = UnixStream::pair().unwrap();
        set_nonblocking(&rx).unwrap();
        let mut reader = Reader::new(IoSource::from_read(rx)).unwrap();

        assert_eq!(reader.block(Some(Duration::from_millis(50))), 0);
        assert!(reader.is_pumping());

        let now = Instant::now();
        reader.close().unwrap();
        assert!(now.elapsed() < Duration::from_secs(5));
        assert!(matches!(reader.stop_reason(), Some(StopReason::Requested)));
    }
}
