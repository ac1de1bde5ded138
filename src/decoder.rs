//! Decoder block: classify frames and apply them to the shared state.
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::trace;

use crate::block::{Block, BlockRet};
use crate::command::CommandWriter;
use crate::message::classify;
use crate::stream::NCReadStream;
use crate::telemetry::Telemetry;
use crate::{Error, Result};

/// Decoder block.
///
/// Takes frames from a [`FrameSource`][crate::frame::FrameSource], and
/// updates the shared [`Telemetry`]. Each message is applied under one lock,
/// so readers never see half a sample. Commands produced (alarms) are sent
/// after the lock is released.
pub struct Decoder {
    src: NCReadStream<String>,
    telemetry: Arc<Mutex<Telemetry>>,
    commands: CommandWriter,
}

impl Decoder {
    /// Create new decoder.
    pub fn new(
        src: NCReadStream<String>,
        telemetry: Arc<Mutex<Telemetry>>,
        commands: CommandWriter,
    ) -> Self {
        Self {
            src,
            telemetry,
            commands,
        }
    }
}

impl Block for Decoder {
    fn block_name(&self) -> &'static str {
        "Decoder"
    }

    fn work(&mut self) -> Result<BlockRet> {
        let mut did = false;
        while let Some(frame) = self.src.pop() {
            did = true;
            let msg = classify(&frame);
            let cmds = {
                let mut t = self
                    .telemetry
                    .lock()
                    .map_err(|e| Error::msg(format!("telemetry lock poisoned: {e}")))?;
                match msg {
                    Some(msg) => t.apply(msg, Instant::now()),
                    None => {
                        t.dropped();
                        Vec::new()
                    }
                }
            };
            for cmd in &cmds {
                trace!("Decoder: sending {cmd:?}");
                self.commands.send(cmd)?;
            }
        }
        if did {
            Ok(BlockRet::Again)
        } else if self.src.eof() {
            Ok(BlockRet::EOF)
        } else {
            Ok(BlockRet::Noop)
        }
    }
}
