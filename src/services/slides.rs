use async_trait::async_trait;
use image::{ImageBuffer, Rgb, RgbImage};
use std::path::{Path, PathBuf};

use crate::models::webhook::EmployeeData;
use crate::services::pipeline::{RenderedSlide, SlideRenderer, StageError};

pub const WIDTH: u32 = 1920;
pub const HEIGHT: u32 = 1080;

const BACKGROUND: [u8; 3] = [0x1a, 0x1a, 0x2e];
const BACKGROUND_LOW: [u8; 3] = [0x0f, 0x34, 0x60];
const ACCENT: [u8; 3] = [0x16, 0xc7, 0x9a];
const ACCENT_BAR: u32 = 24;

/// Text content of one slide.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideContent {
    pub name: &'static str,
    pub title: String,
    pub lines: Vec<String>,
}

impl SlideContent {
    /// Caption handed to the composer: title, blank line, body.
    pub fn caption(&self) -> String {
        if self.lines.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.lines.join("\n"))
        }
    }
}

/// The five slides of an onboarding video, in presentation order.
pub fn slide_deck(employee: &EmployeeData) -> Vec<SlideContent> {
    let mut role = vec![
        format!("Team: {}", employee.team),
        format!("Manager: {}", employee.manager),
        format!("Office: {}", employee.office),
        format!("Start Date: {}", employee.start_date.format("%B %-d, %Y")),
    ];
    if let Some(buddy) = &employee.buddy {
        role.push(format!("Buddy: {buddy}"));
    }

    let tech = if employee.tech_stack.is_empty() {
        vec!["Your team will walk you through the tools".to_string()]
    } else {
        employee.tech_stack.iter().map(|t| format!("- {t}")).collect()
    };

    let schedule = if employee.first_day_schedule.is_empty() {
        vec!["Your manager will share the agenda".to_string()]
    } else {
        employee
            .first_day_schedule
            .iter()
            .map(|item| match &item.location {
                Some(location) => format!("{} - {} ({location})", item.time, item.activity),
                None => format!("{} - {}", item.time, item.activity),
            })
            .collect()
    };

    vec![
        SlideContent {
            name: "welcome",
            title: format!("Welcome, {}!", employee.first_name()),
            lines: vec![employee.position.clone()],
        },
        SlideContent {
            name: "role_team",
            title: "Your Role & Team".to_string(),
            lines: role,
        },
        SlideContent {
            name: "tech_stack",
            title: "Your Tech Stack".to_string(),
            lines: tech,
        },
        SlideContent {
            name: "schedule",
            title: "First Day Schedule".to_string(),
            lines: schedule,
        },
        SlideContent {
            name: "closing",
            title: "We're excited to have you!".to_string(),
            lines: vec![format!("See you on {}", employee.start_date.format("%A"))],
        },
    ]
}

/// Vertical gradient with an accent bar along the top edge.
pub fn render_background() -> RgbImage {
    ImageBuffer::from_fn(WIDTH, HEIGHT, |_, y| {
        if y < ACCENT_BAR {
            return Rgb(ACCENT);
        }
        let t = (y - ACCENT_BAR) as f32 / (HEIGHT - ACCENT_BAR) as f32;
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgb([
            mix(BACKGROUND[0], BACKGROUND_LOW[0]),
            mix(BACKGROUND[1], BACKGROUND_LOW[1]),
            mix(BACKGROUND[2], BACKGROUND_LOW[2]),
        ])
    })
}

/// Renders slide backgrounds with the `image` crate and writes captions as
/// text files for ffmpeg's `drawtext`.
#[derive(Default)]
pub struct ImageSlideRenderer;

impl ImageSlideRenderer {
    pub fn new() -> Self {
        Self
    }
}

// Every slide shares one background; encode it once and copy.
fn write_backgrounds(paths: Vec<PathBuf>) -> Result<(), StageError> {
    let Some((first, rest)) = paths.split_first() else {
        return Ok(());
    };
    render_background()
        .save(first)
        .map_err(|e| StageError::Permanent(format!("saving {}: {e}", first.display())))?;
    for path in rest {
        std::fs::copy(first, path).map_err(|e| StageError::from_io("copying slide", e))?;
    }
    Ok(())
}

#[async_trait]
impl SlideRenderer for ImageSlideRenderer {
    async fn render(
        &self,
        employee: &EmployeeData,
        work_dir: &Path,
    ) -> Result<Vec<RenderedSlide>, StageError> {
        let slides_dir = work_dir.join("slides");
        tokio::fs::create_dir_all(&slides_dir)
            .await
            .map_err(|e| StageError::from_io("creating slides directory", e))?;

        let deck = slide_deck(employee);
        let mut rendered = Vec::with_capacity(deck.len());
        for (idx, slide) in deck.iter().enumerate() {
            let stem = format!("{:02}_{}", idx + 1, slide.name);
            let caption_path = slides_dir.join(format!("{stem}.txt"));
            tokio::fs::write(&caption_path, slide.caption())
                .await
                .map_err(|e| StageError::from_io("writing slide caption", e))?;
            rendered.push(RenderedSlide {
                image_path: slides_dir.join(format!("{stem}.png")),
                caption_path,
            });
        }

        let paths: Vec<PathBuf> = rendered.iter().map(|s| s.image_path.clone()).collect();
        tokio::task::spawn_blocking(move || write_backgrounds(paths))
            .await
            .map_err(|e| StageError::Permanent(format!("slide rendering task failed: {e}")))??;

        tracing::info!(slides = rendered.len(), "Slides rendered");
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::webhook::tests::sample_employee;

    #[test]
    fn test_deck_order_and_content() {
        let deck = slide_deck(&sample_employee());
        let names: Vec<&str> = deck.iter().map(|s| s.name).collect();
        assert_eq!(names, ["welcome", "role_team", "tech_stack", "schedule", "closing"]);
        assert_eq!(deck[0].title, "Welcome, Sarah!");
        assert!(deck[1].lines.contains(&"Start Date: March 3, 2025".to_string()));
        assert_eq!(deck[2].lines, vec!["- Rust", "- PostgreSQL", "- Kubernetes"]);
        assert_eq!(deck[3].lines[0], "9:00 AM - Welcome breakfast (Kitchen)");
        assert_eq!(deck[4].lines[0], "See you on Monday");
    }

    #[test]
    fn test_empty_lists_get_placeholder() {
        let mut employee = sample_employee();
        employee.tech_stack.clear();
        employee.first_day_schedule.clear();
        let deck = slide_deck(&employee);
        assert_eq!(deck[2].lines.len(), 1);
        assert_eq!(deck[3].lines.len(), 1);
    }

    #[test]
    fn test_background_dimensions_and_accent() {
        let image = render_background();
        assert_eq!(image.dimensions(), (WIDTH, HEIGHT));
        assert_eq!(image.get_pixel(0, 0), &Rgb(ACCENT));
        assert_ne!(image.get_pixel(0, HEIGHT - 1), &Rgb(ACCENT));
    }

    #[tokio::test]
    async fn test_render_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let slides = ImageSlideRenderer::new()
            .render(&sample_employee(), dir.path())
            .await
            .unwrap();

        assert_eq!(slides.len(), 5);
        for slide in &slides {
            assert!(slide.image_path.exists());
            assert!(slide.caption_path.exists());
        }
        let caption = std::fs::read_to_string(&slides[0].caption_path).unwrap();
        assert_eq!(caption, "Welcome, Sarah!\n\nSenior Software Engineer");
    }
}
