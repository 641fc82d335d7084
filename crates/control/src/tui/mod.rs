//! Terminal User Interface
//!
//! Interactive feature editor for the open Audio-Widget.

pub mod app;
pub mod events;
pub mod ui;

pub use app::run;
