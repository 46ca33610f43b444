//! Background texture streaming.
//!
//! Decoding runs on a background worker. Its result travels back through the
//! main-thread dispatcher and is applied to the texture table when the frame
//! loop pumps the streamer, so the table only changes on the main thread.
//! A decode that fails or panics is logged and its slot stays pending.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::bail;
use parking_lot::Mutex;
use scenic_core::dispatcher::DrainStats;
use scenic_core::{BackgroundWorker, MainThreadDispatcher, RenderConfig};

use crate::error::Result;

/// Slot of a requested texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(u32);

impl TextureId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureState {
    Pending,
    Ready,
}

/// Decoded RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedTexture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug)]
struct TextureSlot {
    name: String,
    texture: Option<DecodedTexture>,
}

/// Every texture requested so far.
#[derive(Debug, Default)]
pub struct TextureTable {
    slots: Vec<TextureSlot>,
}

impl TextureTable {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn name(&self, id: TextureId) -> Option<&str> {
        self.slots.get(id.0 as usize).map(|slot| slot.name.as_str())
    }

    pub fn state(&self, id: TextureId) -> Option<TextureState> {
        self.slots.get(id.0 as usize).map(|slot| match slot.texture {
            Some(_) => TextureState::Ready,
            None => TextureState::Pending,
        })
    }

    pub fn texture(&self, id: TextureId) -> Option<&DecodedTexture> {
        self.slots.get(id.0 as usize)?.texture.as_ref()
    }

    pub fn ready_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.texture.is_some()).count()
    }

    fn insert_pending(&mut self, name: String) -> TextureId {
        let id = TextureId(self.slots.len() as u32);
        self.slots.push(TextureSlot {
            name,
            texture: None,
        });
        id
    }

    fn complete(&mut self, id: TextureId, texture: DecodedTexture) -> anyhow::Result<()> {
        let expected = u64::from(texture.width) * u64::from(texture.height) * 4;
        if texture.pixels.len() as u64 != expected {
            bail!(
                "texture {id} has {} bytes, expected {expected} for {}x{}",
                texture.pixels.len(),
                texture.width,
                texture.height
            );
        }
        let Some(slot) = self.slots.get_mut(id.0 as usize) else {
            bail!("texture {id} does not exist");
        };
        tracing::debug!(texture = %id, name = %slot.name, width = texture.width, height = texture.height, "texture ready");
        slot.texture = Some(texture);
        Ok(())
    }
}

/// Shared handle to the texture table.
pub type SharedTextureTable = Arc<Mutex<TextureTable>>;

/// Runs texture decodes off the main thread.
pub struct TextureStreamer {
    worker: BackgroundWorker,
    dispatcher: MainThreadDispatcher<TextureTable>,
    table: SharedTextureTable,
}

impl TextureStreamer {
    /// Spawn the decode worker. At most `drain_budget` completions are
    /// applied per [`pump`](Self::pump); zero means unbounded.
    pub fn new(queue_capacity: usize, drain_budget: usize) -> Result<Self> {
        Ok(Self {
            worker: BackgroundWorker::spawn("texture-decode", queue_capacity)?,
            dispatcher: MainThreadDispatcher::new(drain_budget),
            table: Arc::new(Mutex::new(TextureTable::default())),
        })
    }

    /// Streamer sized by `texture_queue_capacity` and drained by
    /// `dispatcher_budget`.
    pub fn from_config(config: &RenderConfig) -> Result<Self> {
        Self::new(config.texture_queue_capacity, config.dispatcher_budget)
    }

    pub fn table(&self) -> SharedTextureTable {
        Arc::clone(&self.table)
    }

    pub fn state(&self, id: TextureId) -> Option<TextureState> {
        self.table.lock().state(id)
    }

    /// Completions waiting for the next pump.
    pub fn pending_completions(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Reserve a pending slot and queue `decode` on the worker.
    pub fn request<F>(&self, name: impl Into<String>, decode: F) -> Result<TextureId>
    where
        F: FnOnce() -> anyhow::Result<DecodedTexture> + Send + 'static,
    {
        let name = name.into();
        let id = self.table.lock().insert_pending(name.clone());
        let sender = self.dispatcher.sender();

        self.worker.submit(move || {
            let decoded = panic::catch_unwind(AssertUnwindSafe(decode));
            let posted = sender.post(move |table: &mut TextureTable| match decoded {
                Ok(Ok(texture)) => table.complete(id, texture),
                Ok(Err(e)) => Err(e.context(format!("decoding {name} failed"))),
                Err(_) => bail!("decoding {name} panicked"),
            });
            if posted.is_err() {
                tracing::warn!(texture = %id, "texture streamer dropped before decode finished");
            }
        })?;
        Ok(id)
    }

    /// Apply finished decodes. Called once per frame on the main thread.
    pub fn pump(&self) -> DrainStats {
        let mut table = self.table.lock();
        self.dispatcher.drain(&mut table)
    }

    /// Finish queued decodes and stop the worker.
    pub fn shutdown(&mut self) {
        self.worker.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32) -> DecodedTexture {
        DecodedTexture {
            width,
            height,
            pixels: vec![255; (width * height * 4) as usize],
        }
    }

    #[test]
    fn decoded_texture_becomes_ready_after_pump() {
        let mut streamer = TextureStreamer::new(4, 0).unwrap();
        let id = streamer.request("albedo", || Ok(solid(2, 2))).unwrap();
        assert_eq!(streamer.state(id), Some(TextureState::Pending));

        streamer.shutdown();
        let stats = streamer.pump();
        assert_eq!(stats.completed, 1);
        assert_eq!(streamer.state(id), Some(TextureState::Ready));
        assert_eq!(streamer.table().lock().texture(id).unwrap().width, 2);
    }

    #[test]
    fn failed_decode_stays_pending() {
        let mut streamer = TextureStreamer::new(4, 0).unwrap();
        let failed = streamer
            .request("broken", || anyhow::bail!("bad header"))
            .unwrap();
        let panicked = streamer
            .request("worse", || panic!("decoder bug"))
            .unwrap();
        let short = streamer
            .request("short", || {
                Ok(DecodedTexture {
                    width: 4,
                    height: 4,
                    pixels: vec![0; 3],
                })
            })
            .unwrap();
        let fine = streamer.request("fine", || Ok(solid(1, 1))).unwrap();

        streamer.shutdown();
        let stats = streamer.pump();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.completed, 1);
        for id in [failed, panicked, short] {
            assert_eq!(streamer.state(id), Some(TextureState::Pending));
        }
        assert_eq!(streamer.state(fine), Some(TextureState::Ready));
    }

    #[test]
    fn pump_respects_budget() {
        let mut streamer = TextureStreamer::new(8, 2).unwrap();
        for i in 0..5 {
            streamer.request(format!("t{i}"), || Ok(solid(1, 1))).unwrap();
        }
        streamer.shutdown();

        let first = streamer.pump();
        assert_eq!(first.completed, 2);
        assert_eq!(first.remaining, 3);
        streamer.pump();
        streamer.pump();
        assert_eq!(streamer.table().lock().ready_count(), 5);
    }

    #[test]
    fn configured_budget_bounds_pump() {
        let config = RenderConfig::from_toml_str("dispatcher_budget = 3").unwrap();
        let mut streamer = TextureStreamer::from_config(&config).unwrap();
        for i in 0..7 {
            streamer.request(format!("t{i}"), || Ok(solid(1, 1))).unwrap();
        }
        streamer.shutdown();

        assert_eq!(streamer.pump().completed, 3);
        assert_eq!(streamer.table().lock().ready_count(), 3);
        assert_eq!(streamer.pump().remaining, 1);
    }
}
