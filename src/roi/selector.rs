use std::sync::{Arc, Mutex};

use opencv::core::{Mat, Point, Scalar, Size, Vector};
use opencv::highgui;
use opencv::imgproc;
use opencv::prelude::*;

use super::{Polygon, Roi, RoiError};

const WINDOW_NAME: &str = "Select the area to watch";
const KEY_ESCAPE: i32 = 27;

const INSTRUCTIONS: [&str; 5] = [
    "INSTRUCTIONS:",
    "1. Click and drag to draw around the area to watch",
    "2. Release the button to finish",
    "3. Press 'S' to confirm",
    "4. Press 'Q' to cancel",
];

pub struct SelectorSession {
    backdrop: Mat,
    points: Vec<Point>,
    drawing: bool,
    outline: Option<Polygon>,
}

impl SelectorSession {
    pub fn new(backdrop: Mat) -> Self {
        Self {
            backdrop,
            points: Vec::new(),
            drawing: false,
            outline: None,
        }
    }

    pub fn handle_mouse(&mut self, event: i32, x: i32, y: i32) -> opencv::Result<Option<Mat>> {
        match event {
            highgui::EVENT_LBUTTONDOWN => {
                self.drawing = true;
                self.outline = None;
                self.points = vec![Point::new(x, y)];
                Ok(None)
            }
            highgui::EVENT_MOUSEMOVE if self.drawing => {
                self.points.push(Point::new(x, y));
                if self.points.len() > 1 {
                    self.render(false).map(Some)
                } else {
                    Ok(None)
                }
            }
            highgui::EVENT_LBUTTONUP if self.drawing => {
                self.drawing = false;
                if self.points.len() > 2 {
                    self.outline = Some(Polygon::new(self.points.clone()));
                    self.render(true).map(Some)
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    pub fn outline(&self) -> Option<&Polygon> {
        self.outline.as_ref()
    }

    fn render(&self, closed: bool) -> opencv::Result<Mat> {
        let mut preview = self.backdrop.try_clone()?;
        let mut contours = Vector::<Vector<Point>>::new();
        contours.push(self.points.iter().copied().collect());
        imgproc::polylines(
            &mut preview,
            &contours,
            closed,
            Scalar::new(0.0, 255.0, 0.0, 0.0),
            2,
            imgproc::LINE_8,
            0,
        )?;
        Ok(preview)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Confirm,
    Cancel,
    Wait,
}

// A window closed from its title bar counts as a cancel.
fn key_action(key: i32, window_visible: bool) -> KeyAction {
    if !window_visible {
        return KeyAction::Cancel;
    }
    match u8::try_from(key).map(char::from) {
        Ok('s' | 'S') => KeyAction::Confirm,
        Ok('q' | 'Q') => KeyAction::Cancel,
        _ if key == KEY_ESCAPE => KeyAction::Cancel,
        _ => KeyAction::Wait,
    }
}

fn confirmed_outline(session: &Mutex<SelectorSession>) -> Result<Option<Polygon>, RoiError> {
    let session = session.lock().map_err(|_| RoiError::SessionUnavailable)?;
    Ok(session.outline().cloned())
}

fn draw_instructions(frame: &mut Mat) -> opencv::Result<()> {
    for (i, text) in INSTRUCTIONS.iter().enumerate() {
        imgproc::put_text(
            frame,
            text,
            Point::new(10, 30 + i as i32 * 30),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.7,
            Scalar::new(0.0, 0.0, 255.0, 0.0),
            2,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(())
}

pub fn select_roi(frame: &Mat, size: Size) -> Result<Roi, RoiError> {
    let mut backdrop = Mat::default();
    imgproc::resize(frame, &mut backdrop, size, 0.0, 0.0, imgproc::INTER_LINEAR)?;
    draw_instructions(&mut backdrop)?;

    highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;
    highgui::imshow(WINDOW_NAME, &backdrop)?;

    let session = Arc::new(Mutex::new(SelectorSession::new(backdrop)));
    let callback_session = Arc::clone(&session);
    highgui::set_mouse_callback(
        WINDOW_NAME,
        Some(Box::new(move |event: i32, x: i32, y: i32, _flags: i32| {
            let Ok(mut session) = callback_session.lock() else {
                return;
            };
            match session.handle_mouse(event, x, y) {
                Ok(Some(preview)) => {
                    if let Err(e) = highgui::imshow(WINDOW_NAME, &preview) {
                        tracing::warn!(error = %e, "failed to show selection preview");
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "failed to draw selection"),
            }
        })),
    )?;

    let selection = loop {
        let key = highgui::wait_key(1)? & 0xFF;
        let visible = highgui::get_window_property(WINDOW_NAME, highgui::WND_PROP_VISIBLE)? >= 1.0;
        match key_action(key, visible) {
            KeyAction::Confirm => match confirmed_outline(&session) {
                Ok(Some(polygon)) => break Ok(polygon),
                Ok(None) => {}
                Err(e) => break Err(e),
            },
            KeyAction::Cancel => break Err(RoiError::Cancelled),
            KeyAction::Wait => {}
        }
    };

    if let Err(e) = highgui::set_mouse_callback(WINDOW_NAME, None)
        .and_then(|_| highgui::destroy_window(WINDOW_NAME))
    {
        tracing::debug!(error = %e, "selector window already gone");
    }

    let polygon = selection?;
    tracing::info!(points = polygon.points().len(), "region selected");
    Roi::new(polygon, size)
}
