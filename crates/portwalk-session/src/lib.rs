//! Portwalk Session
//!
//! Open serial ports with a read that can be cancelled from another task,
//! line parameters that can change while the port is open, modem line
//! control and buffer purges.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use portwalk_core::Mode;
//! use portwalk_session::Session;
//!
//! # async fn example() -> Result<(), portwalk_core::PortError> {
//! let session = Arc::new(Session::open("/dev/ttyACM0", Mode::with_baud_rate(115_200)).await?);
//!
//! let reader = {
//!     let session = session.clone();
//!     tokio::spawn(async move {
//!         let mut buf = [0u8; 64];
//!         session.read(&mut buf).await
//!     })
//! };
//!
//! session.write(b"hello\r\n").await?;
//! session.close().await?;
//! assert!(reader.await.unwrap().is_err());
//! # Ok(())
//! # }
//! ```

pub mod link;
pub mod mock;
pub mod session;

pub use link::{open_link, Buffer, SerialLink};
pub use mock::{mock_link, LinkEvent, MockLink, MockPeer};
pub use session::{Lines, Session};
