// Resolves where pointer actions land, in physical screen pixels.
use crate::agent_engine::context::ExecutionContext;
use crate::agent_engine::state::{ActionSpec, PointerTarget};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::types::{ScreenshotMeta, UIElement};

/// Converts a normalized bbox center to physical screen pixel coordinates.
pub fn normalized_to_physical(element: &UIElement, meta: &ScreenshotMeta) -> (i32, i32) {
    element.center_physical(meta)
}

fn target_point(target: PointerTarget, ctx: &ExecutionContext) -> DeskPilotResult<(i32, i32)> {
    match target {
        PointerTarget::At { x, y } => Ok((x, y)),
        PointerTarget::Variable(name) => ctx.resolve_point(&name).ok_or_else(|| {
            DeskPilotError::Provider(format!("target '{name}' is not a known screen point"))
        }),
    }
}

/// Every point a pointer action touches, resolved against the context.
/// Non-pointer actions touch none.
pub fn pointer_points(spec: &ActionSpec, ctx: &ExecutionContext) -> DeskPilotResult<Vec<(i32, i32)>> {
    match spec {
        ActionSpec::Click { .. } | ActionSpec::DoubleClick { .. } | ActionSpec::RightClick { .. } => {
            let target = spec
                .pointer_target()
                .ok_or_else(|| DeskPilotError::Validation(vec![format!("{}: requires (x, y) or target", spec.kind())]))?;
            Ok(vec![target_point(target, ctx)?])
        }
        ActionSpec::Drag {
            start_x: Some(sx),
            start_y: Some(sy),
            end_x: Some(ex),
            end_y: Some(ey),
        } => Ok(vec![(*sx, *sy), (*ex, *ey)]),
        ActionSpec::Drag { .. } => Err(DeskPilotError::Validation(vec!["drag: incomplete coordinates".into()])),
        ActionSpec::Scroll {
            x: Some(x),
            y: Some(y),
            ..
        } => Ok(vec![(*x, *y)]),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn click_variable_resolves_through_context() {
        let mut ctx = ExecutionContext::new();
        ctx.set_variable("search_box", json!({"x": 640, "y": 80}));
        assert_eq!(
            pointer_points(&ActionSpec::click_target("search_box"), &ctx).unwrap(),
            vec![(640, 80)]
        );
        assert!(matches!(
            pointer_points(&ActionSpec::click_target("nope"), &ctx),
            Err(DeskPilotError::Provider(_))
        ));
    }

    #[test]
    fn drag_and_scroll_points() {
        let ctx = ExecutionContext::new();
        let drag = ActionSpec::Drag {
            start_x: Some(1),
            start_y: Some(2),
            end_x: Some(3),
            end_y: Some(4),
        };
        assert_eq!(pointer_points(&drag, &ctx).unwrap(), vec![(1, 2), (3, 4)]);
        let scroll: ActionSpec = serde_json::from_value(json!({"type": "scroll", "direction": "up"})).unwrap();
        assert!(pointer_points(&scroll, &ctx).unwrap().is_empty());
        assert!(pointer_points(&ActionSpec::type_text("x"), &ctx).unwrap().is_empty());
    }

    #[test]
    fn bbox_center_maps_to_pixels() {
        let element: UIElement =
            serde_json::from_value(json!({"bbox": [0.5, 0.5, 0.7, 0.7], "label": "OK"})).unwrap();
        assert_eq!(
            normalized_to_physical(&element, &ScreenshotMeta::unscaled(1000, 500)),
            (600, 300)
        );
    }
}
