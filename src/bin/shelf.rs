//! shelf - launch games and track play time
//!
//! # Usage
//!
//! ```text
//! shelf launch <game> [--file <path>] [--launcher-id <id>] [--runner <id>]
//! shelf status [<game>]
//! shelf kill <game>
//! shelf reconcile
//! ```
//!
//! Enable debug logging with `RUST_LOG=shelf_tracker=debug`.

fn main() -> anyhow::Result<()> {
    shelf_app::run()
}
