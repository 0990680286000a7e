use bitflags::bitflags;

pub const MAX_RESPONSES_COUNT: usize = 4;

pub const ROOT_DEPTH: i32 = 0;
pub const UNATTACHED_DEPTH: i32 = -1;

pub const CONVERSATION_WIDTH: f32 = 300.0;
pub const CONVERSATION_HEIGHT: f32 = 250.0;
pub const RESPONSE_HEIGHT: f32 = 135.0;
pub const CONVERSATION_SPACE_X: f32 = 250.0;
pub const CONVERSATION_SPACE_Y: f32 = 150.0;
pub const CONVERSATION_STACK_SPACE_TEMP: f32 = 15.0;
pub const CONVERSATION_CONNECTOR_WIDTH: f32 = 21.0; // 22px - border 1px
pub const CONVERSATION_LEFT_TOP_OFFSET: f32 = 50.0;
pub const CANVAS_LEFT_TOP_SPACE: f32 = 50.0;
pub const SVG_CIRCLE_RADIUS: f32 = 10.0;

pub const WINDOW_WIDTH: f32 = 1920.0;
pub const WINDOW_HEIGHT: f32 = 1080.0;

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 1.0;

// Legacy scatter chart: x:y = 2:1, answers reach questions inside this radius.
pub const LEGACY_CIRCLE_RADIUS: f64 = 0.3;
pub const LEGACY_X_AXIS_RATE: f64 = 2.0;
pub const LEGACY_STEP_X: f64 = 1.0;
pub const LEGACY_STEP_Y: f64 = 1.0;

pub const IMAGE_ASSETS_PATH: &str = "assets/images/characters/";
pub const IMAGE_ASSETS_TYPE: &str = "png";

pub const EXPRESSION_NAMES: [&str; 6] = ["default", "happy", "sad", "angry", "surprised", "thinking"];

pub const LINE_SATURATION: u8 = 88;
pub const LINE_LIGHTNESS: u8 = 50;

bitflags! {
    /// Visual state of a conversation or response as seen by the rendering surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeMarks: u8 {
        const ERROR = 1 << 0;
        const START = 1 << 1;
        const SINGLE = 1 << 2;
        const MULTI = 1 << 3;
        const EDITING = 1 << 4;
        const ACTIVE = 1 << 5;
    }
}
