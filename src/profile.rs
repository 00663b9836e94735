//! Export profiles.
//!
//! An [`ExportProfile`] fixes the paginated layout of a capture. A
//! [`RenderProfile`] binds one export profile to an HTTP route together with
//! the viewport and wait behaviour that variant needs, so every endpoint runs
//! the same pipeline and only differs in configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wait::RenderWaitPolicy;
use crate::Viewport;

/// Paper sizes, in inches, as understood by the engine's print pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    A3,
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
    Custom { width: f64, height: f64 },
}

impl PageSize {
    /// Portrait `(width, height)` in inches.
    pub fn dimensions_in(&self) -> (f64, f64) {
        match *self {
            PageSize::A3 => (11.7, 16.54),
            PageSize::A4 => (8.27, 11.7),
            PageSize::A5 => (5.83, 8.27),
            PageSize::Letter => (8.5, 11.0),
            PageSize::Legal => (8.5, 14.0),
            PageSize::Tabloid => (11.0, 17.0),
            PageSize::Custom { width, height } => (width, height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    #[default]
    Landscape,
}

/// Page margins in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margins {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        [self.top, self.right, self.bottom, self.left]
            .iter()
            .all(|m| m.is_finite() && *m >= 0.0)
    }
}

/// Layout options for a single paginated capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportProfile {
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub scale: f64,
    pub print_background: bool,
    pub margins: Margins,
}

impl Default for ExportProfile {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            orientation: Orientation::Landscape,
            scale: 0.9,
            print_background: true,
            margins: Margins::zero(),
        }
    }
}

/// One endpoint variant: where it is mounted and how it renders.
#[derive(Debug, Clone)]
pub struct RenderProfile {
    pub name: String,
    pub route: String,
    /// Value of the `filename=` parameter in `Content-Disposition`.
    pub filename: String,
    pub viewport: Option<Viewport>,
    pub export: ExportProfile,
    pub wait: RenderWaitPolicy,
}

impl RenderProfile {
    /// `POST /generate-pdf`: engine default viewport, 10s settle.
    pub fn standard(wait: RenderWaitPolicy) -> Self {
        Self {
            name: "standard".to_string(),
            route: "/generate-pdf".to_string(),
            filename: "generated-report.pdf".to_string(),
            viewport: None,
            export: ExportProfile::default(),
            wait: RenderWaitPolicy {
                settle_delay: Duration::from_secs(10),
                scroll_before_settle: false,
                ..wait
            },
        }
    }

    /// `POST /generate-amp-pdf`: compact viewport, scroll to trigger lazy
    /// content, 25s settle.
    pub fn amp(wait: RenderWaitPolicy) -> Self {
        Self {
            name: "amp".to_string(),
            route: "/generate-amp-pdf".to_string(),
            filename: "generated-amp-report.pdf".to_string(),
            viewport: Some(Viewport::new(600, 960)),
            export: ExportProfile {
                scale: 1.0,
                ..ExportProfile::default()
            },
            wait: RenderWaitPolicy {
                settle_delay: Duration::from_secs(25),
                scroll_before_settle: true,
                ..wait
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_dimensions_match_print_pipeline() {
        assert_eq!(PageSize::A4.dimensions_in(), (8.27, 11.7));
        assert_eq!(
            PageSize::Custom {
                width: 4.0,
                height: 6.0
            }
            .dimensions_in(),
            (4.0, 6.0)
        );
    }

    #[test]
    fn default_export_profile_is_landscape_a4_without_margins() {
        let profile = ExportProfile::default();
        assert_eq!(profile.page_size, PageSize::A4);
        assert_eq!(profile.orientation, Orientation::Landscape);
        assert!(profile.print_background);
        assert_eq!(profile.margins, Margins::zero());
        assert!((profile.scale - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn builtin_profiles_share_margins_but_not_viewport() {
        let standard = RenderProfile::standard(RenderWaitPolicy::default());
        let amp = RenderProfile::amp(RenderWaitPolicy::default());

        assert_eq!(standard.route, "/generate-pdf");
        assert_eq!(amp.route, "/generate-amp-pdf");
        assert_eq!(standard.export.margins, amp.export.margins);
        assert!(standard.viewport.is_none());
        assert_eq!(amp.viewport, Some(Viewport::new(600, 960)));
        assert_eq!(standard.wait.settle_delay, Duration::from_secs(10));
        assert_eq!(amp.wait.settle_delay, Duration::from_secs(25));
        assert!(amp.wait.scroll_before_settle);
    }

    #[test]
    fn negative_margins_are_invalid() {
        let margins = Margins {
            top: -0.1,
            ..Margins::zero()
        };
        assert!(!margins.is_valid());
        assert!(Margins::zero().is_valid());
    }

    #[test]
    fn page_size_parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            size: PageSize,
        }
        let w: Wrapper = toml::from_str("size = \"letter\"").unwrap();
        assert_eq!(w.size, PageSize::Letter);
        let w: Wrapper = toml::from_str("size = { custom = { width = 4.0, height = 6.0 } }").unwrap();
        assert_eq!(
            w.size,
            PageSize::Custom {
                width: 4.0,
                height: 6.0
            }
        );
    }
}
