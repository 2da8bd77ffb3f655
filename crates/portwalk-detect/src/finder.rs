//! Locating a port by USB identity
//!
//! Devices re-enumerate after a reset or firmware upload, and their port
//! name may change in the process. These helpers look a port up by VID/PID
//! and poll until it shows up or goes away.

use std::time::Duration;

use portwalk_core::{PortDetails, PortError};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// First port whose USB identity matches, ignoring case
pub fn find_port<'a>(ports: &'a [PortDetails], vid: &str, pid: &str) -> Option<&'a PortDetails> {
    ports
        .iter()
        .find(|port| port.usb.as_ref().is_some_and(|usb| usb.matches(vid, pid)))
}

/// Re-enumerate every `interval` until a matching port appears.
///
/// Returns the port name, or `None` once `timeout` is spent. Enumeration
/// errors end the wait.
pub async fn poll_for_port<F>(
    mut source: F,
    vid: &str,
    pid: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<String>, PortError>
where
    F: FnMut() -> Result<Vec<PortDetails>, PortError>,
{
    info!(vid, pid, "Waiting for port");
    let deadline = Instant::now() + timeout;

    loop {
        let ports = source()?;
        if let Some(port) = find_port(&ports, vid, pid) {
            info!(port = %port.name, vid, pid, "Port found");
            return Ok(Some(port.name.clone()));
        }
        if Instant::now() + interval > deadline {
            debug!(vid, pid, "Gave up waiting for port");
            return Ok(None);
        }
        sleep(interval).await;
    }
}

/// Re-enumerate every `interval` until no matching port is left.
///
/// Returns `true` when the port disappeared within `timeout`.
pub async fn wait_for_port_to_disappear<F>(
    mut source: F,
    vid: &str,
    pid: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<bool, PortError>
where
    F: FnMut() -> Result<Vec<PortDetails>, PortError>,
{
    let deadline = Instant::now() + timeout;

    loop {
        let ports = source()?;
        if find_port(&ports, vid, pid).is_none() {
            debug!(vid, pid, "Port is gone");
            return Ok(true);
        }
        if Instant::now() + interval > deadline {
            return Ok(false);
        }
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portwalk_core::UsbIdentity;

    fn usb_port(name: &str, vid: &str, pid: &str) -> PortDetails {
        PortDetails {
            usb: Some(UsbIdentity::new(vid, pid, None)),
            ..PortDetails::new(name)
        }
    }

    #[test]
    fn find_ignores_case_and_non_usb_ports() {
        let ports = vec![
            PortDetails::new("COM1"),
            usb_port("COM4", "10C4", "EA60"),
            usb_port("COM7", "2341", "8036"),
        ];
        assert_eq!(find_port(&ports, "10c4", "ea60").unwrap().name, "COM4");
        assert_eq!(find_port(&ports, "2341", "8036").unwrap().name, "COM7");
        assert!(find_port(&ports, "0403", "6001").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_finds_port_after_reenumeration() {
        let mut calls = 0;
        let found = poll_for_port(
            || {
                calls += 1;
                if calls < 3 {
                    Ok(vec![PortDetails::new("COM1")])
                } else {
                    Ok(vec![usb_port("COM9", "2341", "8036")])
                }
            },
            "2341",
            "8036",
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert_eq!(found.as_deref(), Some("COM9"));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_gives_up_at_timeout() {
        let mut calls = 0;
        let found = poll_for_port(
            || {
                calls += 1;
                Ok(Vec::new())
            },
            "2341",
            "8036",
            Duration::from_millis(450),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert_eq!(found, None);
        assert_eq!(calls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_stops_on_enumeration_error() {
        let err = poll_for_port(
            || Err(PortError::EnumerationFailed("class set unavailable".into())),
            "2341",
            "8036",
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PortError::EnumerationFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn disappear_reports_whether_port_left() {
        let mut calls = 0;
        let gone = wait_for_port_to_disappear(
            || {
                calls += 1;
                if calls < 2 {
                    Ok(vec![usb_port("COM9", "2341", "8036")])
                } else {
                    Ok(Vec::new())
                }
            },
            "2341",
            "8036",
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert!(gone);

        let gone = wait_for_port_to_disappear(
            || Ok(vec![usb_port("COM9", "2341", "8036")]),
            "2341",
            "8036",
            Duration::from_millis(300),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert!(!gone);
    }
}
