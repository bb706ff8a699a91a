//! Target localization: template synthesis and matching.

pub mod matcher;
pub mod template;

pub use matcher::{locate_beam_spot, match_template, TemplateMatch};
pub use template::Template;
