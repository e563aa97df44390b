//! Geometry for the client-side overlay: structure boxes, the yard box and
//! beam lines. Everything here is read-only over the yard and the world.

use glam::DVec3;
use serde::Serialize;
use yard_core::{Line, OrientedBox, StructureId, StructureProvider, Yard, YardState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const GREEN: Color = Color::rgb(0, 128, 0);
    pub const CYAN: Color = Color::rgb(0, 255, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const CORNFLOWER_BLUE: Color = Color::rgb(100, 149, 237);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawBox {
    pub structure: StructureId,
    pub bounds: OrientedBox,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawLine {
    pub line: Line,
    pub color: Color,
}

/// One frame of overlay geometry for a yard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrawFrame {
    pub boxes: Vec<DrawBox>,
    pub lines: Vec<DrawLine>,
}

impl DrawFrame {
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() && self.lines.is_empty()
    }
}

/// Build the overlay for `yard`. Structure guides only show while the yard
/// is disabled with guides on; the yard box shows while it is active.
pub fn compute_draw_frame(yard: &Yard, provider: &dyn StructureProvider) -> DrawFrame {
    let guides = yard.state() == YardState::Disabled && yard.settings().guide_enabled;

    let ((contained, intersecting), beams) = rayon::join(
        || {
            if !guides {
                return (Vec::new(), Vec::new());
            }
            rayon::join(
                || structure_boxes(provider, yard.contained(), Color::GREEN, Color::CYAN),
                || {
                    structure_boxes(
                        provider,
                        yard.intersecting(),
                        Color::YELLOW,
                        Color::CORNFLOWER_BLUE,
                    )
                },
            )
        },
        || beam_lines(yard),
    );

    let mut frame = DrawFrame {
        boxes: contained,
        lines: Vec::new(),
    };
    frame.boxes.extend(intersecting);
    if !matches!(yard.state(), YardState::Disabled | YardState::Invalid) {
        frame.lines.extend(yard.box_lines().iter().map(|line| DrawLine {
            line: *line,
            color: Color::WHITE,
        }));
    }
    frame.lines.extend(beams);
    frame
}

fn structure_boxes<'a>(
    provider: &dyn StructureProvider,
    ids: impl IntoIterator<Item = &'a StructureId>,
    physical: Color,
    projection: Color,
) -> Vec<DrawBox> {
    ids.into_iter()
        .filter_map(|id| provider.structure(*id))
        // Ghosts and finished projections have nothing to show.
        .filter(|view| view.is_candidate())
        .map(|view| DrawBox {
            structure: view.id,
            bounds: view.bounds,
            color: if view.is_virtual() { projection } else { physical },
        })
        .collect()
}

/// One line per active beam, from the tool to the target's last known
/// position.
fn beam_lines(yard: &Yard) -> Vec<DrawLine> {
    yard.assignments()
        .active()
        .into_iter()
        .filter_map(|(tool, _beam, key)| {
            let start: DVec3 = yard.tools().get(tool)?.position;
            let end = yard.catalog().get(key)?.position;
            Some(DrawLine {
                line: Line { start, end },
                color: beam_color(yard.state()),
            })
        })
        .collect()
}

fn beam_color(state: YardState) -> Color {
    match state {
        YardState::Grind => Color::YELLOW,
        _ => Color::CYAN,
    }
}
