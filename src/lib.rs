pub mod backend;
pub mod capabilities;
pub mod diff;
pub mod document;
pub mod engine;
pub mod formatting;
pub mod language;
pub mod line_index;
pub mod module_resolver;
pub mod provider;
pub mod settings;
pub mod workspace;
