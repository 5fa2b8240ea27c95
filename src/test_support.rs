// In-memory capability providers for unit tests.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::agent_engine::engine::ConfirmationHandler;
use crate::agent_engine::state::{ActionSequence, ScrollDirection};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::apps::AppController;
use crate::executor::dispatcher::Capabilities;
use crate::executor::input::{KeyController, PointerController};
use crate::perception::traits::{ScreenAnalyzer, ScreenCapture, TextExtractor};
use crate::perception::types::{
    ElementType, ImageHandle, OcrResult, ScreenAnalysis, ScreenshotMeta, UIElement,
};

pub const STUB_SCREEN: (u32, u32) = (1000, 800);

#[derive(Default)]
struct StubState {
    calls: AtomicUsize,
    captures: AtomicUsize,
    clicks: AtomicUsize,
    key_calls: AtomicUsize,
    fail_next_clicks: AtomicUsize,
    fail_at: Mutex<Option<(i32, i32)>>,
    clicked: Mutex<Vec<(i32, i32)>>,
    screen_text: Mutex<String>,
}

/// Records every provider call; clicks can be told to fail.
#[derive(Clone, Default)]
pub struct StubDesktop(Arc<StubState>);

impl StubDesktop {
    pub fn capabilities(&self) -> Capabilities {
        let stub = Arc::new(self.clone());
        Capabilities {
            capture: stub.clone(),
            ocr: stub.clone(),
            vision: stub.clone(),
            pointer: stub.clone(),
            keys: stub.clone(),
            apps: stub,
        }
    }

    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> usize {
        self.0.captures.load(Ordering::SeqCst)
    }

    pub fn pointer_clicks(&self) -> usize {
        self.0.clicks.load(Ordering::SeqCst)
    }

    pub fn key_calls(&self) -> usize {
        self.0.key_calls.load(Ordering::SeqCst)
    }

    pub fn clicked_points(&self) -> Vec<(i32, i32)> {
        self.0.clicked.lock().unwrap().clone()
    }

    pub fn fail_next_clicks(&self, n: usize) {
        self.0.fail_next_clicks.store(n, Ordering::SeqCst);
    }

    pub fn fail_click_at(&self, point: (i32, i32)) {
        *self.0.fail_at.lock().unwrap() = Some(point);
    }

    pub fn set_screen_text(&self, text: &str) {
        *self.0.screen_text.lock().unwrap() = text.to_string();
    }

    fn hit(&self) {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn key(&self) -> DeskPilotResult<bool> {
        self.hit();
        self.0.key_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[async_trait]
impl ScreenCapture for StubDesktop {
    async fn capture(&self) -> DeskPilotResult<ImageHandle> {
        self.hit();
        self.0.captures.fetch_add(1, Ordering::SeqCst);
        Ok(ImageHandle::new(
            vec![0u8; 16],
            ScreenshotMeta::unscaled(STUB_SCREEN.0, STUB_SCREEN.1),
        ))
    }
}

#[async_trait]
impl TextExtractor for StubDesktop {
    async fn extract_text(&self, _image: &ImageHandle) -> DeskPilotResult<OcrResult> {
        self.hit();
        Ok(OcrResult {
            text: self.0.screen_text.lock().unwrap().clone(),
            words: Vec::new(),
            confidence: 0.9,
        })
    }
}

#[async_trait]
impl ScreenAnalyzer for StubDesktop {
    async fn analyze(&self, _image: &ImageHandle, objective: &str) -> DeskPilotResult<ScreenAnalysis> {
        self.hit();
        Ok(ScreenAnalysis {
            elements: vec![UIElement {
                id: "e0".into(),
                node_type: ElementType::Button,
                bbox: [0.4, 0.4, 0.6, 0.6],
                content: Some("Submit".into()),
                confidence: 0.95,
            }],
            description: format!("stub screen for: {objective}"),
            scene_type: "form".into(),
        })
    }
}

#[async_trait]
impl PointerController for StubDesktop {
    async fn click(&self, x: i32, y: i32) -> DeskPilotResult<bool> {
        self.hit();
        self.0.clicks.fetch_add(1, Ordering::SeqCst);
        let pending = self.0.fail_next_clicks.load(Ordering::SeqCst);
        if pending > 0 {
            self.0.fail_next_clicks.store(pending - 1, Ordering::SeqCst);
            return Err(DeskPilotError::Input("stub click failure".into()));
        }
        if *self.0.fail_at.lock().unwrap() == Some((x, y)) {
            return Err(DeskPilotError::Input(format!("stub click failure at ({x}, {y})")));
        }
        self.0.clicked.lock().unwrap().push((x, y));
        Ok(true)
    }

    async fn double_click(&self, x: i32, y: i32) -> DeskPilotResult<bool> {
        self.click(x, y).await
    }

    async fn right_click(&self, x: i32, y: i32) -> DeskPilotResult<bool> {
        self.click(x, y).await
    }

    async fn drag(&self, _from: (i32, i32), _to: (i32, i32)) -> DeskPilotResult<bool> {
        self.hit();
        Ok(true)
    }

    async fn scroll(&self, _direction: ScrollDirection, _amount: i32, _at: Option<(i32, i32)>) -> DeskPilotResult<bool> {
        self.hit();
        Ok(true)
    }
}

#[async_trait]
impl KeyController for StubDesktop {
    async fn type_text(&self, _text: &str) -> DeskPilotResult<bool> {
        self.key()
    }

    async fn press(&self, _key: &str) -> DeskPilotResult<bool> {
        self.key()
    }

    async fn hotkey(&self, _keys: &[String]) -> DeskPilotResult<bool> {
        self.key()
    }
}

#[async_trait]
impl AppController for StubDesktop {
    async fn find(&self, name: &str) -> DeskPilotResult<bool> {
        self.hit();
        Ok(name == "running")
    }

    async fn activate(&self, _name: &str) -> DeskPilotResult<bool> {
        self.hit();
        Ok(true)
    }

    async fn launch(&self, _name: &str) -> DeskPilotResult<bool> {
        self.hit();
        Ok(true)
    }

    async fn close(&self, _name: &str) -> DeskPilotResult<bool> {
        self.hit();
        Ok(true)
    }
}

/// Confirmation handler that blocks until [`release`](Self::release), then
/// declines.
#[derive(Default)]
pub struct BlockingGate(Notify);

impl BlockingGate {
    pub fn release(&self) {
        self.0.notify_one();
    }
}

#[async_trait]
impl ConfirmationHandler for BlockingGate {
    async fn confirm(&self, _sequence: &ActionSequence) -> bool {
        self.0.notified().await;
        false
    }
}
