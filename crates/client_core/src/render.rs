use std::fmt::Write as _;

use crate::{
    chain::FieldPhase,
    controller::{FieldSnapshot, FormSnapshot},
};

pub trait FormRenderer {
    type Output;

    fn render(&self, state: &FormSnapshot) -> Self::Output;
}

#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub title: String,
    pub flash: Option<String>,
}

impl PageContext {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            flash: None,
        }
    }

    pub fn with_flash(mut self, flash: impl Into<String>) -> Self {
        self.flash = Some(flash.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct TextFormRenderer {
    page: PageContext,
}

impl TextFormRenderer {
    pub fn new(page: PageContext) -> Self {
        Self { page }
    }

    fn render_field(&self, out: &mut String, position: usize, field: &FieldSnapshot) {
        let marker = match field.phase {
            FieldPhase::Selected => "[x]",
            FieldPhase::Loading => "[~]",
            _ if field.enabled => "[ ]",
            _ => "[-]",
        };
        let value = match field.phase {
            FieldPhase::Selected => field
                .value
                .as_deref()
                .map(|v| {
                    field
                        .options
                        .iter()
                        .find(|o| o.value == v)
                        .map_or_else(|| v.to_string(), |o| o.label.clone())
                })
                .unwrap_or_default(),
            FieldPhase::Loading => "loading...".to_string(),
            FieldPhase::Ready if field.options.is_empty() => "no options available".to_string(),
            FieldPhase::Ready => format!("{} options", field.options.len()),
            FieldPhase::Empty if field.enabled => "required".to_string(),
            FieldPhase::Empty => "locked".to_string(),
        };
        let _ = writeln!(out, "{marker} {}. {}: {value}", position + 1, field.label);

        if field.enabled && field.phase == FieldPhase::Ready {
            for (n, option) in field.options.iter().enumerate() {
                let _ = writeln!(out, "      {}) {}", n + 1, option.label);
            }
        }
        if let Some(error) = &field.error {
            let _ = writeln!(out, "      ! {error}");
        }
    }
}

impl FormRenderer for TextFormRenderer {
    type Output = String;

    fn render(&self, state: &FormSnapshot) -> String {
        let mut out = String::new();
        if !self.page.title.is_empty() {
            let _ = writeln!(out, "== {} ==", self.page.title);
        }
        if let Some(flash) = &self.page.flash {
            let _ = writeln!(out, "* {flash}");
        }
        if let Some(error) = &state.general_error {
            let _ = writeln!(out, "!! {error}");
        }
        for (position, field) in state.fields.iter().enumerate() {
            self.render_field(&mut out, position, field);
        }
        if state.submitting {
            let _ = writeln!(out, "Submitting...");
        } else if state.is_complete() {
            let _ = writeln!(out, "Ready to submit.");
        }
        out
    }
}
