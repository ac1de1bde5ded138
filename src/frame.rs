/*! Frame tokenizer.

Splits a raw byte stream into delimiter-terminated frames, e.g.
`16:1:01:25.5|16:1:02:60.0|` becomes `16:1:01:25.5` and `16:1:02:60.0`.

Decoding is lenient. Bytes that are not valid UTF-8 are dropped, not
replaced, and they don't abort the frame they're in.
 */
use std::io::{BufRead, BufReader, ErrorKind, Read};

use log::{debug, trace, warn};

use crate::Result;
use crate::block::{Block, BlockRet};
use crate::stream::{NCReadStream, NCWriteStream, new_nocopy_stream};

/// Frame delimiter on the wire.
pub const DELIMITER: u8 = b'|';

/// Longest frame accepted. Anything longer without a delimiter is line
/// noise, and is discarded.
pub const MAX_FRAME_LEN: usize = 1024;

/// Decode bytes as UTF-8, dropping anything that isn't.
#[must_use]
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        s.push_str(chunk.valid());
    }
    s
}

/// Turn raw frame bytes into the text to classify.
///
/// Strips the trailing delimiter and surrounding whitespace. Returns `None`
/// for frames with nothing left.
#[must_use]
pub fn clean_frame(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_suffix(&[DELIMITER]).unwrap_or(bytes);
    let s = decode_lossy(bytes);
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

enum Outcome {
    Frame(Vec<u8>),
    Nothing,
    Closed,
}

/** Frame source block.

Reads from any byte source, and outputs every non-empty frame as a
`String`. Reads block until a delimiter is seen or the source is closed.

Read timeouts (`WouldBlock`, `TimedOut`) from the source are not errors.
The partial frame is kept, and the block reports `Pending`, so the graph
backs off before asking again.
*/
pub struct FrameSource {
    reader: BufReader<Box<dyn Read + Send>>,
    partial: Vec<u8>,
    closed: bool,
    dst: Option<NCWriteStream<String>>,
}

impl FrameSource {
    /// Create a new frame source reading from `reader`.
    pub fn new<R: Read + Send + 'static>(reader: R) -> (Self, NCReadStream<String>) {
        let (dst, rx) = new_nocopy_stream();
        (
            Self {
                reader: BufReader::new(Box::new(reader)),
                partial: Vec::with_capacity(MAX_FRAME_LEN),
                closed: false,
                dst: Some(dst),
            },
            rx,
        )
    }

    fn read_frame(&mut self) -> Result<Outcome> {
        let limit = MAX_FRAME_LEN.saturating_sub(self.partial.len()) as u64;
        let n = match (&mut self.reader)
            .take(limit)
            .read_until(DELIMITER, &mut self.partial)
        {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                trace!("FrameSource: read timed out, {} bytes pending", self.partial.len());
                return Ok(Outcome::Nothing);
            }
            Err(e) => return Err(e.into()),
        };
        if self.partial.last() == Some(&DELIMITER) {
            return Ok(Outcome::Frame(std::mem::take(&mut self.partial)));
        }
        if self.partial.len() >= MAX_FRAME_LEN {
            warn!(
                "FrameSource: no delimiter in {} bytes, discarding",
                self.partial.len()
            );
            self.partial.clear();
            return Ok(Outcome::Nothing);
        }
        // Short read without delimiter means end of stream.
        self.closed = true;
        if n == 0 && self.partial.is_empty() {
            return Ok(Outcome::Closed);
        }
        debug!("FrameSource: stream closed mid-frame");
        Ok(Outcome::Frame(std::mem::take(&mut self.partial)))
    }
}

impl Block for FrameSource {
    fn block_name(&self) -> &'static str {
        "FrameSource"
    }

    fn work(&mut self) -> Result<BlockRet> {
        if self.closed || self.dst.is_none() {
            // Dropping the writer tells the decoder there's no more.
            self.dst = None;
            return Ok(BlockRet::EOF);
        }
        match self.read_frame()? {
            Outcome::Closed => {
                debug!("FrameSource: byte stream closed");
                self.dst = None;
                Ok(BlockRet::EOF)
            }
            Outcome::Nothing => Ok(BlockRet::Pending),
            Outcome::Frame(bytes) => match clean_frame(&bytes) {
                None => {
                    trace!("FrameSource: empty frame");
                    Ok(BlockRet::Pending)
                }
                Some(frame) => {
                    trace!("FrameSource: frame {frame:?}");
                    if let Some(dst) = &self.dst {
                        dst.push(frame);
                    }
                    Ok(BlockRet::Again)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_of(data: &[u8]) -> Result<Vec<String>> {
        let (mut src, rx) = FrameSource::new(std::io::Cursor::new(data.to_vec()));
        while src.work()? != BlockRet::EOF {}
        let mut out = Vec::new();
        while let Some(f) = rx.pop() {
            out.push(f);
        }
        Ok(out)
    }

    #[test]
    fn splits_on_delimiter() -> Result<()> {
        assert_eq!(
            frames_of(b"16:1:01:25.5|16:1:02:60.0|\r\n16:1:03:26.0|")?,
            vec!["16:1:01:25.5", "16:1:02:60.0", "16:1:03:26.0"]
        );
        Ok(())
    }

    #[test]
    fn empty_frames() -> Result<()> {
        let (mut src, rx) = FrameSource::new(std::io::Cursor::new(b"|| \n |".to_vec()));
        assert_eq!(src.work()?, BlockRet::Pending);
        assert_eq!(src.work()?, BlockRet::Pending);
        assert_eq!(src.work()?, BlockRet::Pending);
        assert_eq!(src.work()?, BlockRet::EOF);
        assert!(rx.eof());
        Ok(())
    }

    #[test]
    fn invalid_utf8_dropped() -> Result<()> {
        assert_eq!(frames_of(b"16:0:H\xffi\xc3|")?, vec!["16:0:Hi"]);
        Ok(())
    }

    #[test]
    fn trailing_partial_on_close() -> Result<()> {
        assert_eq!(frames_of(b"16:2:0:90|16:2:-1")?, vec!["16:2:0:90", "16:2:-1"]);
        Ok(())
    }

    #[test]
    fn overlong_discarded() -> Result<()> {
        let mut data = vec![b'x'; MAX_FRAME_LEN + 10];
        data.extend(b"|16:2:-1|");
        // The tail of the noise becomes its own (garbage) frame.
        let got = frames_of(&data)?;
        assert_eq!(got.last().map(String::as_str), Some("16:2:-1"));
        assert!(got.iter().all(|f| f.len() < MAX_FRAME_LEN));
        Ok(())
    }

    #[test]
    fn timeout_keeps_partial() -> Result<()> {
        struct Chunks(Vec<std::io::Result<Vec<u8>>>);
        impl Read for Chunks {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                let data = self.0.remove(0)?;
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
        }
        let (mut src, rx) = FrameSource::new(Chunks(vec![
            Ok(b"16:3:0:".to_vec()),
            Err(ErrorKind::TimedOut.into()),
            Ok(b"45:12.0|".to_vec()),
        ]));
        assert_eq!(src.work()?, BlockRet::Pending);
        assert!(rx.is_empty());
        assert_eq!(src.work()?, BlockRet::Again);
        assert_eq!(rx.pop().as_deref(), Some("16:3:0:45:12.0"));
        assert_eq!(src.work()?, BlockRet::EOF);
        Ok(())
    }
}
