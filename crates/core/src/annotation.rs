use crate::ViewMode;

/// Squared pixel distance within which a click removes an annotation.
pub const REMOVE_RADIUS_SQ: i64 = 500;

const MIN_POINT_SIZE: i32 = 4;
const POINT_SIZE_STEP: i32 = 2;

/// Font descriptor stored with each annotation.
///
/// The numeric codes are opaque to the core; they are whatever the renderer
/// reported when the annotation was created and are written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontSpec {
    pub point_size: i32,
    pub family: i32,
    pub style: i32,
    pub weight: i32,
    pub encoding: i32,
    pub face_name: String,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            point_size: 12,
            family: 70,
            style: 90,
            weight: 90,
            encoding: 0,
            face_name: String::new(),
        }
    }
}

impl FontSpec {
    pub fn grow(&mut self) {
        self.point_size = self.point_size.saturating_add(POINT_SIZE_STEP);
    }

    pub fn shrink(&mut self) {
        self.point_size = (self.point_size - POINT_SIZE_STEP).max(MIN_POINT_SIZE);
    }
}

/// Text placed on a page, in image coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Annotation {
    pub x: i32,
    pub y: i32,
    pub text: String,
    pub font: FontSpec,
    pub mode: ViewMode,
}

impl Annotation {
    pub fn new(x: i32, y: i32, text: &str, mut font: FontSpec, mode: ViewMode) -> Self {
        font.face_name = single_line(&font.face_name);
        Self {
            x,
            y,
            text: single_line(text),
            font,
            mode,
        }
    }

    pub fn is_visible_in(&self, mode: ViewMode) -> bool {
        self.mode == mode
    }

    pub fn is_near(&self, x: i32, y: i32) -> bool {
        let dx = i64::from(self.x) - i64::from(x);
        let dy = i64::from(self.y) - i64::from(y);
        dx * dx + dy * dy < REMOVE_RADIUS_SQ
    }
}

/// Flattens text so it fits on one record line.
pub fn single_line(text: &str) -> String {
    text.trim_end_matches(['\n', '\r'])
        .chars()
        .map(|ch| if matches!(ch, '\n' | '\r') { ' ' } else { ch })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_strips_line_breaks() {
        let font = FontSpec {
            face_name: "Arial\r\n".to_string(),
            ..FontSpec::default()
        };
        let a = Annotation::new(1, 2, "cresc.\nsubito\n", font, ViewMode::TwoPage);
        assert_eq!(a.text, "cresc. subito");
        assert_eq!(a.font.face_name, "Arial");
    }

    #[test]
    fn proximity_uses_squared_radius() {
        let a = Annotation::new(100, 100, "p", FontSpec::default(), ViewMode::FitWidth);
        assert!(a.is_near(110, 110));
        assert!(a.is_near(122, 100));
        assert!(!a.is_near(123, 100));
    }

    #[test]
    fn font_shrink_stops_at_minimum() {
        let mut font = FontSpec {
            point_size: 6,
            ..FontSpec::default()
        };
        font.shrink();
        font.shrink();
        assert_eq!(font.point_size, 4);
        font.grow();
        assert_eq!(font.point_size, 6);
    }

    #[test]
    fn visibility_follows_mode_tag() {
        let a = Annotation::new(0, 0, "rit.", FontSpec::default(), ViewMode::TwoPage);
        assert!(a.is_visible_in(ViewMode::TwoPage));
        assert!(!a.is_visible_in(ViewMode::FitWidth));
    }
}
