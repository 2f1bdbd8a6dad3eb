//! Walk a printer through the command sequence of a one-label job.
//!
//! Run with:
//!   cargo run --example print-job -- /dev/rfcomm0
//!
//! No image data is sent; the printer feeds one blank label.

use std::sync::Arc;

use thermlink::session::PrinterSession;
use thermlink::transport::SerialPort;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let device = std::env::args()
        .nth(1)
        .ok_or("usage: print-job <device>")?;

    let mut session = PrinterSession::new(Arc::new(SerialPort::new(&device)));
    session.open()?;
    eprintln!("Connected to {device}, model {}", session.device_type().await?);

    session.set_label_density(3).await?;
    session.set_label_type(1).await?;
    session.start_print().await?;
    session.start_page_print().await?;
    session.set_dimension(240, 384).await?;
    session.set_quantity(1).await?;
    session.end_page_print().await?;

    let status = session.print_status().await?;
    eprintln!("page {} progress {}/{}", status.page, status.progress1, status.progress2);

    session.end_print().await?;
    session.close()?;
    Ok(())
}
