//! bgtrim command-line tool
//!
//! Background removal, edge trimming and Supabase upload for product photos.

#[cfg(feature = "cli")]
use bgtrim::cli;

#[cfg(feature = "cli")]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
