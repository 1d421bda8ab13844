//! Serial line source for the JeeLink receiver
use futures_util::Stream;
use log::{debug, info};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, FramedRead};

use crate::error::SourceError;

// Longest line the sketch prints is its banner; anything beyond this is noise
const MAX_LINE_LENGTH: usize = 512;

/// A stream of raw lines with the terminator already removed
pub trait LineSource: Stream<Item = Result<Vec<u8>, SourceError>> + Unpin + Send {
    /// Throw away whatever the receiver queued while nobody was reading
    fn discard_pending(&mut self) -> Result<(), SourceError>;
}

/// Opens (and reopens) the line source owned by the scheduler
pub trait SourceOpener: Send {
    type Source: LineSource;

    fn open(&mut self) -> Result<Self::Source, SourceError>;
}

/// Splits the byte stream on LF and drops a trailing CR.
///
/// Lines are handed on as raw bytes, so radio noise reaches the frame
/// decoder and is rejected there. Lines longer than the limit are skipped
/// up to the next LF; the codec itself never fails.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    discarding: bool,
}

impl LineCodec {
    pub fn new(max_length: usize) -> Self {
        LineCodec {
            max_length,
            discarding: false,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        LineCodec::new(MAX_LINE_LENGTH)
    }
}

fn without_cr(mut line: Vec<u8>) -> Vec<u8> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    line
}

impl Decoder for LineCodec {
    type Item = Vec<u8>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_length {
                    if !self.discarding {
                        debug!("Skipping line longer than {} bytes", self.max_length);
                    }
                    self.discarding = true;
                    src.clear();
                }
                return Ok(None);
            };

            let line = src.split_to(newline).to_vec();
            src.advance(1);

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_length {
                debug!("Skipping line longer than {} bytes", self.max_length);
                continue;
            }

            return Ok(Some(without_cr(line)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() || self.discarding {
            src.clear();
            return Ok(None);
        }

        let line = src.split().to_vec();
        Ok(Some(without_cr(line)))
    }
}

/// Lines read from an open serial port
pub struct SerialLineSource {
    lines: FramedRead<SerialStream, LineCodec>,
}

impl Stream for SerialLineSource {
    type Item = Result<Vec<u8>, SourceError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.lines)
            .poll_next(cx)
            .map(|item| item.map(|line| line.map_err(SourceError::Io)))
    }
}

impl LineSource for SerialLineSource {
    fn discard_pending(&mut self) -> Result<(), SourceError> {
        let queued = self.lines.read_buffer().len();
        self.lines.read_buffer_mut().clear();
        self.lines.decoder_mut().discarding = false;
        self.lines
            .get_ref()
            .clear(ClearBuffer::Input)
            .map_err(|e| SourceError::Io(e.into()))?;
        debug!("Discarded {} buffered bytes and the port input queue", queued);
        Ok(())
    }
}

/// Opens the configured serial device
#[derive(Debug, Clone)]
pub struct SerialOpener {
    pub path: String,
    pub baud_rate: u32,
}

impl SerialOpener {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        SerialOpener {
            path: path.into(),
            baud_rate,
        }
    }
}

impl SourceOpener for SerialOpener {
    type Source = SerialLineSource;

    fn open(&mut self) -> Result<SerialLineSource, SourceError> {
        let port = tokio_serial::new(&self.path, self.baud_rate)
            .open_native_async()
            .map_err(|source| SourceError::Open {
                path: self.path.clone(),
                source,
            })?;

        info!("Serial port {} open at {} baud", self.path, self.baud_rate);

        Ok(SerialLineSource {
            lines: FramedRead::new(port, LineCodec::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    async fn lines(input: &[u8], codec: LineCodec) -> Vec<Vec<u8>> {
        FramedRead::new(input, codec)
            .map(|line| line.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn codec_accepts_lf_and_crlf() {
        let input: &[u8] = b"OK 9 56 1 4 156 37\r\nOK 9 49 1 4 182 54\n\r\n";

        assert_eq!(
            lines(input, LineCodec::default()).await,
            vec![
                b"OK 9 56 1 4 156 37".to_vec(),
                b"OK 9 49 1 4 182 54".to_vec(),
                Vec::new(),
            ]
        );
    }

    #[tokio::test]
    async fn non_text_bytes_are_passed_through() {
        let input: &[u8] = b"OK 9 56 1 4 156 37\n\xff\xfe noise\nOK 9 49 1 4 182 54\n";

        assert_eq!(
            lines(input, LineCodec::default()).await,
            vec![
                b"OK 9 56 1 4 156 37".to_vec(),
                b"\xff\xfe noise".to_vec(),
                b"OK 9 49 1 4 182 54".to_vec(),
            ]
        );
    }

    #[tokio::test]
    async fn overlong_lines_are_skipped_not_fatal() {
        let mut input = vec![b'A'; MAX_LINE_LENGTH + 10];
        input.extend_from_slice(b"\nOK 9 56 1 4 156 37\n");

        assert_eq!(
            lines(&input, LineCodec::default()).await,
            vec![b"OK 9 56 1 4 156 37".to_vec()]
        );
    }

    #[test]
    fn overlong_line_split_across_reads_is_skipped() {
        let mut codec = LineCodec::new(8);
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());

        buf.extend_from_slice(b"abc\nOK 9\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"OK 9".to_vec()));
    }

    #[tokio::test]
    async fn last_line_without_terminator_is_kept() {
        assert_eq!(
            lines(b"OK 9 56 1 4 156 37\nOK 9", LineCodec::default()).await,
            vec![b"OK 9 56 1 4 156 37".to_vec(), b"OK 9".to_vec()]
        );
    }

    #[tokio::test]
    async fn opening_missing_device_fails() {
        let mut opener = SerialOpener::new("/dev/does-not-exist-jeelink", 57600);
        assert!(matches!(opener.open(), Err(SourceError::Open { .. })));
    }
}
