//! Shared collaborators and fixtures for session integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use retouch_pipeline::{ResultImage, TransformError, TransformRequest, TransformResponse, Transformer};
use retouch_session::{Editor, EngineConfig};
use tokio::sync::oneshot;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Answers every call with a solid image the size of the source.
pub struct SolidFill {
    pub color: [u8; 4],
    pub calls: AtomicUsize,
}

impl SolidFill {
    pub fn new(color: [u8; 4]) -> Arc<Self> {
        Arc::new(Self {
            color,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transformer for SolidFill {
    async fn transform(&self, request: TransformRequest) -> Result<TransformResponse, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = request.source_image.dimensions();
        Ok(TransformResponse::new(ResultImage::Raster(RgbaImage::from_pixel(
            w,
            h,
            Rgba(self.color),
        ))))
    }
}

/// Fails every call.
pub struct Failing(pub fn() -> TransformError);

#[async_trait]
impl Transformer for Failing {
    async fn transform(&self, _request: TransformRequest) -> Result<TransformResponse, TransformError> {
        Err((self.0)())
    }
}

/// Returns a fixed encoded result, optionally after a release signal.
pub struct Scripted {
    pub result: Mutex<Option<ResultImage>>,
    pub gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl Scripted {
    pub fn new(result: ResultImage) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Some(result)),
            gate: Mutex::new(None),
        })
    }

    pub fn arm(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }
}

#[async_trait]
impl Transformer for Scripted {
    async fn transform(&self, _request: TransformRequest) -> Result<TransformResponse, TransformError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.await
                .map_err(|_| TransformError::Network("gate dropped".to_string()))?;
        }
        self.result
            .lock()
            .unwrap()
            .take()
            .map(TransformResponse::new)
            .ok_or_else(|| TransformError::InvalidResult("already answered".to_string()))
    }
}

/// Horizontal gradient so layer edits are visible in the composite.
pub fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = u8::try_from(x * 255 / width.max(1)).unwrap_or(255);
        let g = u8::try_from(y * 255 / height.max(1)).unwrap_or(255);
        Rgba([r, g, 90, 255])
    })
}

pub fn editor_with(transformer: Arc<dyn Transformer>, width: u32, height: u32) -> Editor {
    Editor::new(gradient(width, height), transformer, EngineConfig::default()).unwrap()
}
