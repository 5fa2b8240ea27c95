// Routes one action to the capability provider that performs it.
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::agent_engine::context::ExecutionContext;
use crate::agent_engine::state::ActionSpec;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::apps::AppController;
use crate::executor::coordinator::normalized_to_physical;
use crate::executor::input::{KeyController, PointerController};
use crate::perception::traits::{ScreenAnalyzer, ScreenCapture, TextExtractor};
use crate::perception::types::ImageHandle;

/// Pause between focusing the address bar and typing into it.
const ADDRESS_BAR_SETTLE: Duration = Duration::from_millis(150);

/// Every provider the executor can call.
#[derive(Clone)]
pub struct Capabilities {
    pub capture: Arc<dyn ScreenCapture>,
    pub ocr: Arc<dyn TextExtractor>,
    pub vision: Arc<dyn ScreenAnalyzer>,
    pub pointer: Arc<dyn PointerController>,
    pub keys: Arc<dyn KeyController>,
    pub apps: Arc<dyn AppController>,
}

#[cfg(feature = "desktop")]
impl Capabilities {
    /// xcap capture, enigo input, system app control and LLM-backed vision.
    pub fn desktop(registry: Arc<crate::llm::registry::ProviderRegistry>) -> Self {
        let vision = Arc::new(crate::perception::vision::LlmVisionAnalyzer::new(registry));
        let input = Arc::new(crate::executor::input::EnigoInput);
        Self {
            capture: Arc::new(crate::perception::screenshot::XcapScreenCapture),
            ocr: vision.clone(),
            vision,
            pointer: input.clone(),
            keys: input,
            apps: Arc::new(crate::executor::apps::SystemAppController),
        }
    }
}

fn ensure(ok: bool, what: &str) -> DeskPilotResult<()> {
    if ok {
        Ok(())
    } else {
        Err(DeskPilotError::Provider(format!("{what} reported failure")))
    }
}

fn point(points: &[(i32, i32)], index: usize) -> DeskPilotResult<(i32, i32)> {
    points
        .get(index)
        .copied()
        .ok_or_else(|| DeskPilotError::Provider("pointer target was not resolved".into()))
}

/// Most recent capture, taking a new one if the run has none yet.
async fn current_image(caps: &Capabilities, ctx: &mut ExecutionContext) -> DeskPilotResult<ImageHandle> {
    if let Some(image) = &ctx.last_capture {
        return Ok(image.clone());
    }
    let image = caps.capture.capture().await?;
    ctx.last_capture = Some(image.clone());
    Ok(image)
}

fn address_bar_chord() -> Vec<String> {
    let modifier = if cfg!(target_os = "macos") { "cmd" } else { "ctrl" };
    vec![modifier.to_string(), "l".to_string()]
}

/// Performs `spec` with already resolved and policy-checked `points`.
/// Returns the action's result payload.
pub async fn dispatch(
    spec: &ActionSpec,
    points: &[(i32, i32)],
    caps: &Capabilities,
    ctx: &mut ExecutionContext,
) -> DeskPilotResult<Value> {
    match spec {
        ActionSpec::Screenshot => {
            let image = caps.capture.capture().await?;
            let summary = image.summary();
            ctx.last_capture = Some(image);
            Ok(summary)
        }

        ActionSpec::AnalyzeScreen { objective } => {
            let image = current_image(caps, ctx).await?;
            let analysis = caps.vision.analyze(&image, objective).await?;
            let value = serde_json::to_value(&analysis)?;
            ctx.last_analysis = Some(analysis);
            Ok(value)
        }

        ActionSpec::ExtractText { output } => {
            let image = current_image(caps, ctx).await?;
            let ocr = caps.ocr.extract_text(&image).await?;
            if let Some(name) = output {
                ctx.set_variable(name.clone(), Value::String(ocr.text.clone()));
            }
            let value = json!({
                "text": &ocr.text,
                "words": ocr.words.len(),
                "confidence": ocr.confidence,
            });
            ctx.last_text = Some(ocr);
            Ok(value)
        }

        ActionSpec::FindElement { description, output } => {
            let image = current_image(caps, ctx).await?;
            let analysis = caps
                .vision
                .analyze(&image, &format!("Locate this element: {description}"))
                .await?;
            let found = analysis
                .find_element(description)
                .map(|element| {
                    let (x, y) = normalized_to_physical(element, &image.meta);
                    json!({
                        "x": x,
                        "y": y,
                        "label": element.content,
                        "confidence": element.confidence,
                        "bbox": element.bbox,
                    })
                })
                .ok_or_else(|| DeskPilotError::Perception(format!("element not found: {description}")))?;
            ctx.last_analysis = Some(analysis);
            if let Some(name) = output {
                ctx.set_variable(name.clone(), found.clone());
            }
            Ok(found)
        }

        ActionSpec::Click { .. } => {
            let (x, y) = point(points, 0)?;
            ensure(caps.pointer.click(x, y).await?, "click")?;
            Ok(json!({"x": x, "y": y}))
        }
        ActionSpec::DoubleClick { .. } => {
            let (x, y) = point(points, 0)?;
            ensure(caps.pointer.double_click(x, y).await?, "double_click")?;
            Ok(json!({"x": x, "y": y}))
        }
        ActionSpec::RightClick { .. } => {
            let (x, y) = point(points, 0)?;
            ensure(caps.pointer.right_click(x, y).await?, "right_click")?;
            Ok(json!({"x": x, "y": y}))
        }
        ActionSpec::Drag { .. } => {
            let from = point(points, 0)?;
            let to = point(points, 1)?;
            ensure(caps.pointer.drag(from, to).await?, "drag")?;
            Ok(json!({"from": [from.0, from.1], "to": [to.0, to.1]}))
        }
        ActionSpec::Scroll { direction, amount, .. } => {
            ensure(
                caps.pointer.scroll(*direction, *amount, points.first().copied()).await?,
                "scroll",
            )?;
            Ok(json!({"direction": direction, "amount": amount}))
        }

        ActionSpec::TypeText { text } => {
            ensure(caps.keys.type_text(text).await?, "type_text")?;
            Ok(json!({"chars": text.chars().count()}))
        }
        ActionSpec::PressKey { key } => {
            ensure(caps.keys.press(key).await?, "press_key")?;
            Ok(json!({"key": key}))
        }
        ActionSpec::Hotkey { keys } => {
            ensure(caps.keys.hotkey(keys).await?, "hotkey")?;
            Ok(json!({"keys": keys}))
        }

        ActionSpec::Wait { duration } => {
            tokio::time::sleep(Duration::try_from_secs_f64(*duration).unwrap_or(Duration::ZERO)).await;
            Ok(json!({"waited_secs": duration}))
        }

        ActionSpec::OpenApp { app_name } => {
            let running = caps.apps.find(app_name).await.unwrap_or(false);
            if running && caps.apps.activate(app_name).await.unwrap_or(false) {
                return Ok(json!({"app": app_name, "launched": false}));
            }
            ensure(caps.apps.launch(app_name).await?, "launch")?;
            Ok(json!({"app": app_name, "launched": true}))
        }
        ActionSpec::SwitchApp { app_name } => {
            if !caps.apps.find(app_name).await? {
                return Err(DeskPilotError::App(format!("{app_name} is not running")));
            }
            ensure(caps.apps.activate(app_name).await?, "activate")?;
            Ok(json!({"app": app_name}))
        }
        ActionSpec::CloseApp { app_name } => {
            ensure(caps.apps.close(app_name).await?, "close")?;
            Ok(json!({"app": app_name}))
        }

        ActionSpec::NavigateUrl { url } => {
            ensure(caps.keys.hotkey(&address_bar_chord()).await?, "focus address bar")?;
            tokio::time::sleep(ADDRESS_BAR_SETTLE).await;
            ensure(caps.keys.type_text(url).await?, "type url")?;
            ensure(caps.keys.press("enter").await?, "press enter")?;
            Ok(json!({"url": url}))
        }

        ActionSpec::Verify { expected } => {
            let image = current_image(caps, ctx).await?;
            let ocr = caps.ocr.extract_text(&image).await?;
            let visible = ocr.text.to_lowercase().contains(&expected.to_lowercase());
            ctx.last_text = Some(ocr);
            if visible {
                Ok(json!({"verified": true, "expected": expected}))
            } else {
                Err(DeskPilotError::Perception(format!("\"{expected}\" not visible on screen")))
            }
        }
    }
}
