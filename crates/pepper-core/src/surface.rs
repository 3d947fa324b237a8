//! Snapshot types describing the remote glasses surface.
//!
//! A [`RemoteContainerSpec`] is built from scratch for every reconciliation
//! and never mutated afterwards; gateway adapters receive it by reference and
//! serialise it into the vendor container payload.

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::layout::{wrap_alert, ALERT_MAX_LINE_LENGTH};
use crate::state::DisplayState;

/// Width of the glasses canvas in pixels.
pub const SURFACE_WIDTH: u32 = 576;

pub const LINE1_ID: u32 = 1;
pub const LINE2_ID: u32 = 2;
pub const TIMER_ID: u32 = 3;
pub const ALERT_ID: u32 = 4;

pub const LINE1_NAME: &str = "line1";
pub const LINE2_NAME: &str = "line2";
pub const TIMER_NAME: &str = "timer";
pub const ALERT_NAME: &str = "alert";

/// Border and padding attributes shared by text and list regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionFrame {
    pub border_width: u32,
    pub border_color: u32,
    // Field name as spelled by the vendor bridge.
    #[serde(rename = "borderRdaius")]
    pub border_radius: u32,
    pub padding_length: u32,
}

impl RegionFrame {
    pub const fn rounded(padding_length: u32) -> Self {
        Self {
            border_width: 1,
            border_color: 13,
            border_radius: 6,
            padding_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRegion {
    #[serde(rename = "containerID")]
    pub id: u32,
    #[serde(rename = "containerName")]
    pub name: String,
    #[serde(rename = "xPosition")]
    pub x: u32,
    #[serde(rename = "yPosition")]
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub frame: Option<RegionFrame>,
    #[serde(rename = "isEventCapture", serialize_with = "flag")]
    pub event_capture: bool,
    pub content: String,
}

impl TextRegion {
    pub fn new(id: u32, name: &str, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            x,
            y,
            width,
            height,
            frame: None,
            event_capture: false,
            content: String::new(),
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn capture_events(mut self) -> Self {
        self.event_capture = true;
        self
    }

    pub fn framed(mut self, frame: RegionFrame) -> Self {
        self.frame = Some(frame);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItems {
    pub item_count: usize,
    pub item_width: u32,
    #[serde(rename = "isItemSelectBorderEn", serialize_with = "flag")]
    pub select_border: bool,
    pub item_name: Vec<String>,
}

/// A selectable list region, used by the reader's chapter picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListRegion {
    #[serde(rename = "containerID")]
    pub id: u32,
    #[serde(rename = "containerName")]
    pub name: String,
    #[serde(rename = "xPosition")]
    pub x: u32,
    #[serde(rename = "yPosition")]
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub frame: Option<RegionFrame>,
    #[serde(rename = "isEventCapture", serialize_with = "flag")]
    pub event_capture: bool,
    #[serde(rename = "itemContainer")]
    pub items: ListItems,
}

/// Full description of every region on the surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteContainerSpec {
    pub lists: Vec<ListRegion>,
    pub texts: Vec<TextRegion>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainerPayload<'a> {
    container_total_num: usize,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    list_object: &'a [ListRegion],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    text_object: &'a [TextRegion],
}

impl RemoteContainerSpec {
    /// Builds the teleprompter layout for `state`.
    ///
    /// Region geometry depends only on which optional regions are present:
    /// `line1` narrows to make room for the timer, and the alert box grows
    /// upwards with its wrapped line count.
    pub fn for_display(state: &DisplayState) -> Self {
        let timer = state.visible_timer_text();

        let line1_width = if timer.is_some() { 440 } else { SURFACE_WIDTH };
        let mut texts = vec![
            TextRegion::new(LINE1_ID, LINE1_NAME, 0, 0, line1_width, 144)
                .content(state.line1.clone())
                .capture_events(),
            TextRegion::new(LINE2_ID, LINE2_NAME, 0, 200, SURFACE_WIDTH, 88)
                .content(state.line2.clone()),
        ];

        if let Some(timer) = timer {
            texts.push(TextRegion::new(TIMER_ID, TIMER_NAME, 450, 0, 126, 44).content(timer));
        }

        if let Some(alert) = state.alert_text() {
            let lines = wrap_alert(alert, ALERT_MAX_LINE_LENGTH);
            let (y, height) = match lines.len() {
                1 => (140, 44),
                2 => (120, 88),
                _ => (100, 132),
            };
            texts.push(
                TextRegion::new(ALERT_ID, ALERT_NAME, 300, y, 276, height).content(lines.join("\n")),
            );
        }

        Self {
            lists: Vec::new(),
            texts,
        }
    }

    pub fn container_total_num(&self) -> usize {
        self.lists.len() + self.texts.len()
    }

    pub fn text(&self, name: &str) -> Option<&TextRegion> {
        self.texts.iter().find(|region| region.name == name)
    }

    pub fn list(&self, name: &str) -> Option<&ListRegion> {
        self.lists.iter().find(|region| region.name == name)
    }

    /// Vendor container payload (`containerTotalNum`, `listObject`, `textObject`).
    pub fn to_payload(&self) -> Value {
        let payload = ContainerPayload {
            container_total_num: self.container_total_num(),
            list_object: &self.lists,
            text_object: &self.texts,
        };
        serde_json::to_value(payload).unwrap_or(Value::Null)
    }
}

/// Incremental content update for a single text region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionPatch {
    #[serde(rename = "containerID")]
    pub id: u32,
    #[serde(rename = "containerName")]
    pub name: String,
    pub content: String,
}

impl RegionPatch {
    pub fn new(id: u32, name: &str, content: impl Into<String>) -> Self {
        Self {
            id,
            name: name.to_string(),
            content: content.into(),
        }
    }
}

/// One remote call against the glasses surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOp {
    /// First-time creation of the surface.
    Initialize(RemoteContainerSpec),
    /// Replace every region in one call.
    Rebuild(RemoteContainerSpec),
    /// Update a single region's content.
    Patch(RegionPatch),
    Teardown { exit_mode: i32 },
}

impl SurfaceOp {
    pub fn kind(&self) -> &'static str {
        match self {
            SurfaceOp::Initialize(_) => "initialize",
            SurfaceOp::Rebuild(_) => "rebuild",
            SurfaceOp::Patch(_) => "patch",
            SurfaceOp::Teardown { .. } => "teardown",
        }
    }

    pub fn spec(&self) -> Option<&RemoteContainerSpec> {
        match self {
            SurfaceOp::Initialize(spec) | SurfaceOp::Rebuild(spec) => Some(spec),
            _ => None,
        }
    }
}

fn flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}
