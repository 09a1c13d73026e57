//! Shared type definitions for the stressfeed telemetry monitor.
//!
//! Every crate in the workspace speaks in terms of the canonical
//! [`Reading`]: the source adapters produce it, the freshness arbiter
//! holds it, and the live-update stream serializes it for the dashboard.
//! Types flow downstream to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`instant`] -- [`EpochMillis`], the single comparable notion of time
//! - [`reading`] -- [`Reading`] and its parts ([`StressLevel`],
//!   [`SourceTag`], [`Identity`])
//! - [`stream`] -- [`StreamMessage`], the live-update wire format

pub mod instant;
pub mod reading;
pub mod stream;

pub use instant::EpochMillis;
pub use reading::{Identity, Reading, SourceTag, StressLevel};
pub use stream::StreamMessage;

#[cfg(test)]
mod tests {
    #[test]
    fn export_bindings() {
        // ts-rs writes the bindings into `bindings/` relative to the
        // crate root when these are invoked.
        use ts_rs::TS;

        let _ = crate::instant::EpochMillis::export_all();
        let _ = crate::reading::StressLevel::export_all();
        let _ = crate::reading::SourceTag::export_all();
        let _ = crate::reading::Identity::export_all();
        let _ = crate::reading::Reading::export_all();
        let _ = crate::stream::StreamMessage::export_all();
    }
}
