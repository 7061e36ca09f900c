//! # photo-import CLI
//!
//! Command-line interface for the photo importer.
//!
//! ## Usage
//! ```bash
//! photo-import run /media/CARD01 --destination ~/Pictures
//! photo-import run /media/CARD01 -d ~/Pictures --backup /mnt/backup1
//! ```

mod cli;

use photo_importer::Result;

fn main() -> Result<()> {
    photo_importer::init_tracing();
    cli::run()
}
