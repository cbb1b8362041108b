//! EISCP receiver control
//!
//! TCP control of an Onkyo/Integra A/V receiver: volume and mute query and
//! control, with a background monitor thread that keeps the shared volume
//! state current for the OSD overlay. The socket is not reconnected on
//! failure; errors are logged and the thread keeps polling.

use crate::clock::Clock;
use crate::config::ReceiverConfig;
use crate::error::{Error, Result};

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

const HEADER_SIZE: usize = 16;
const SOCKET_TIMEOUT: Duration = Duration::from_secs(2);
const MONITOR_POLL: Duration = Duration::from_millis(500);
const QUERY_INTERVAL_NS: i64 = 5_000_000_000;

/// Build an EISCP packet: "ISCP", header size 16 and data size as 32-bit
/// big-endian, version 1, three reserved bytes, then `!1<cmd><param>\r\n`.
/// The data size counts `!1<cmd><param>` without the terminator.
pub fn build_packet(command: &str, parameter: &str) -> Vec<u8> {
    let data_size = (2 + command.len() + parameter.len()) as u32;

    let mut packet = Vec::with_capacity(HEADER_SIZE + data_size as usize + 2);
    packet.extend_from_slice(b"ISCP");
    packet.extend_from_slice(&(HEADER_SIZE as u32).to_be_bytes());
    packet.extend_from_slice(&data_size.to_be_bytes());
    packet.push(0x01);
    packet.extend_from_slice(&[0x00, 0x00, 0x00]);
    packet.extend_from_slice(b"!1");
    packet.extend_from_slice(command.as_bytes());
    packet.extend_from_slice(parameter.as_bytes());
    packet.extend_from_slice(b"\r\n");
    packet
}

/// Parse an EISCP packet back into (command, parameter). Trailing CR/LF/EOF
/// bytes inside the data region are tolerated.
pub fn parse_packet(packet: &[u8]) -> Result<(String, String)> {
    if packet.len() < HEADER_SIZE + 5 {
        return Err(Error::InvalidData(format!(
            "EISCP packet too small: {} bytes",
            packet.len()
        )));
    }
    if &packet[0..4] != b"ISCP" {
        return Err(Error::InvalidData("EISCP magic mismatch".into()));
    }

    let data_size =
        u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]) as usize;
    if packet.len() < HEADER_SIZE + data_size {
        return Err(Error::InvalidData(format!(
            "EISCP packet truncated: expected {} data bytes, have {}",
            data_size,
            packet.len() - HEADER_SIZE
        )));
    }

    let data = &packet[HEADER_SIZE..HEADER_SIZE + data_size];
    let data: &[u8] = match data {
        [rest @ .., b'\n'] => rest,
        other => other,
    };
    let data: &[u8] = match data {
        [rest @ .., b'\r'] => rest,
        other => other,
    };

    if data.len() < 5 || &data[0..2] != b"!1" {
        return Err(Error::InvalidData("EISCP data missing '!1' prefix".into()));
    }
    let command = String::from_utf8_lossy(&data[2..5]).to_string();
    let parameter = String::from_utf8_lossy(&data[5..])
        .trim_end_matches(['\r', '\n', '\x1a'])
        .to_string();
    Ok((command, parameter))
}

/// Volume state shared with the OSD overlay
#[derive(Debug, Clone, Copy)]
pub struct VolumeState {
    /// 0-100 scale
    pub level: i32,
    /// Raw device level
    pub raw_level: i32,
    pub muted: bool,
    /// Raw level that maps to 100%
    pub max_volume: i32,
    pub changed: bool,
    pub last_change_ns: i64,
}

impl VolumeState {
    fn new(max_volume: i32) -> Self {
        Self {
            level: 0,
            raw_level: 0,
            muted: false,
            max_volume: max_volume.max(1),
            changed: false,
            last_change_ns: 0,
        }
    }
}

pub struct ReceiverControl {
    stream: Option<TcpStream>,
    volume: Arc<Mutex<VolumeState>>,
    clock: Arc<dyn Clock>,
    monitor_running: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl ReceiverControl {
    pub fn new(clock: Arc<dyn Clock>, max_volume: i32) -> Self {
        Self {
            stream: None,
            volume: Arc::new(Mutex::new(VolumeState::new(max_volume))),
            clock,
            monitor_running: Arc::new(AtomicBool::new(false)),
            monitor: None,
        }
    }

    pub fn connect(&mut self, config: &ReceiverConfig) -> Result<()> {
        let address: SocketAddr = format!("{}:{}", config.ip_address, config.port)
            .parse()
            .map_err(|_| {
                Error::InvalidParameter(format!("receiver address '{}'", config.ip_address))
            })?;

        tracing::info!("connecting to receiver at {address}");
        let stream = TcpStream::connect_timeout(&address, SOCKET_TIMEOUT)
            .map_err(|err| Error::ConnectionFailed(format!("{address}: {err}")))?;
        stream
            .set_write_timeout(Some(SOCKET_TIMEOUT))
            .map_err(Error::Io)?;
        stream
            .set_read_timeout(Some(SOCKET_TIMEOUT))
            .map_err(Error::Io)?;
        self.stream = Some(stream);
        tracing::info!("receiver connected");

        // Prime the volume state
        if let Err(err) = self.query_volume() {
            tracing::warn!("initial volume query failed: {err}");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn send_command(&mut self, command: &str, parameter: &str) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(Error::NotInitialized("receiver control"))?;
        let packet = build_packet(command, parameter);
        stream
            .write_all(&packet)
            .map_err(|err| Error::ConnectionFailed(format!("send: {err}")))
    }

    pub fn receive_response(&mut self, timeout: Duration) -> Result<(String, String)> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(Error::NotInitialized("receiver control"))?;
        read_response(stream, timeout)
    }

    pub fn query_volume(&mut self) -> Result<()> {
        self.send_command("MVL", "QSTN")?;
        let (command, parameter) = self.receive_response(Duration::from_secs(1))?;
        if command == "MVL" {
            handle_volume_parameter(&parameter, &self.volume, self.clock.as_ref());
        }
        Ok(())
    }

    /// Set volume on the 0-100 scale
    pub fn set_volume(&mut self, level: i32) -> Result<()> {
        let raw = {
            let volume = self.volume.lock().unwrap();
            level * volume.max_volume / 100
        };
        self.set_volume_raw(raw)
    }

    pub fn set_volume_raw(&mut self, raw_level: i32) -> Result<()> {
        let clamped = {
            let volume = self.volume.lock().unwrap();
            raw_level.clamp(0, volume.max_volume)
        };
        self.send_command("MVL", &format!("{clamped:02X}"))
    }

    pub fn volume_up(&mut self) -> Result<()> {
        self.send_command("MVL", "UP")
    }

    pub fn volume_down(&mut self) -> Result<()> {
        self.send_command("MVL", "DOWN")
    }

    pub fn toggle_mute(&mut self) -> Result<()> {
        self.send_command("AMT", "TG")
    }

    pub fn set_mute(&mut self, muted: bool) -> Result<()> {
        self.send_command("AMT", if muted { "01" } else { "00" })
    }

    pub fn volume_info(&self) -> VolumeState {
        *self.volume.lock().unwrap()
    }

    /// Start the background monitor: poll for unsolicited volume and mute
    /// updates, re-querying every 5 seconds. Socket errors are logged and
    /// polling continues on the existing connection.
    pub fn start_monitoring(&mut self) -> Result<()> {
        if self.monitor_running.load(Ordering::SeqCst) {
            return Ok(());
        }
        let stream = self
            .stream
            .as_ref()
            .ok_or(Error::NotInitialized("receiver control"))?
            .try_clone()
            .map_err(Error::Io)?;

        self.monitor_running.store(true, Ordering::SeqCst);
        let running = self.monitor_running.clone();
        let volume = self.volume.clone();
        let clock = self.clock.clone();

        self.monitor = Some(std::thread::spawn(move || {
            tracing::info!("receiver monitor thread started");
            let mut stream = stream;
            let mut last_query_ns = clock.now_ns();

            while running.load(Ordering::SeqCst) {
                match read_response(&mut stream, MONITOR_POLL) {
                    Ok((command, parameter)) => match command.as_str() {
                        "MVL" => handle_volume_parameter(&parameter, &volume, clock.as_ref()),
                        "AMT" => {
                            let mut state = volume.lock().unwrap();
                            state.muted = parameter == "01";
                            state.changed = true;
                            state.last_change_ns = clock.now_ns();
                        }
                        _ => {}
                    },
                    Err(Error::Timeout(_)) => {}
                    Err(err) => {
                        tracing::warn!("receiver monitor: {err}");
                    }
                }

                let now = clock.now_ns();
                if now - last_query_ns >= QUERY_INTERVAL_NS {
                    let packet = build_packet("MVL", "QSTN");
                    if let Err(err) = stream.write_all(&packet) {
                        tracing::warn!("receiver periodic query failed: {err}");
                    }
                    last_query_ns = now;
                }
            }
            tracing::info!("receiver monitor thread stopped");
        }));
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.monitor_running.store(false, Ordering::SeqCst);
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.join();
        }
        self.stream = None;
        tracing::info!("receiver disconnected");
    }
}

impl Drop for ReceiverControl {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_response(stream: &mut TcpStream, timeout: Duration) -> Result<(String, String)> {
    stream.set_read_timeout(Some(timeout)).map_err(Error::Io)?;

    let mut header = [0u8; HEADER_SIZE];
    if let Err(err) = stream.read_exact(&mut header) {
        return match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                Err(Error::Timeout("receiver response"))
            }
            _ => Err(Error::ConnectionFailed(format!("recv header: {err}"))),
        };
    }
    if &header[0..4] != b"ISCP" {
        return Err(Error::InvalidData("EISCP magic mismatch".into()));
    }
    let data_size = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
    if data_size == 0 || data_size > 4096 {
        return Err(Error::InvalidData(format!("EISCP data size {data_size}")));
    }

    // The terminator is not counted in the data size
    let mut data = vec![0u8; data_size + 2];
    stream
        .read_exact(&mut data)
        .map_err(|err| Error::ConnectionFailed(format!("recv data: {err}")))?;

    let mut packet = header.to_vec();
    packet.extend_from_slice(&data);
    parse_packet(&packet)
}

/// Parameter is a two-digit uppercase hex raw level, or "N/A" when unknown
fn handle_volume_parameter(parameter: &str, volume: &Mutex<VolumeState>, clock: &dyn Clock) {
    if parameter == "N/A" || parameter.is_empty() {
        return;
    }
    let Ok(raw_level) = i32::from_str_radix(parameter, 16) else {
        tracing::warn!("unparseable volume parameter '{parameter}'");
        return;
    };

    let mut state = volume.lock().unwrap();
    let changed = state.raw_level != raw_level;
    state.raw_level = raw_level;
    state.level = raw_level * 100 / state.max_volume;
    if changed {
        state.changed = true;
        state.last_change_ns = clock.now_ns();
        tracing::debug!("volume changed: {} (raw {raw_level})", state.level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::net::TcpListener;

    #[test]
    fn build_matches_wire_reference() {
        let packet = build_packet("MVL", "UP");
        let expected: Vec<u8> = vec![
            b'I', b'S', b'C', b'P', // magic
            0x00, 0x00, 0x00, 0x10, // header size 16
            0x00, 0x00, 0x00, 0x07, // data size 7
            0x01, // version
            0x00, 0x00, 0x00, // reserved
            b'!', b'1', b'M', b'V', b'L', b'U', b'P', 0x0D, 0x0A,
        ];
        assert_eq!(packet, expected);
    }

    #[test]
    fn round_trip_any_command() {
        for (command, parameter) in [
            ("MVL", "UP"),
            ("MVL", "32"),
            ("MVL", "QSTN"),
            ("AMT", "01"),
            ("AMT", "TG"),
            ("PWR", ""),
        ] {
            let packet = build_packet(command, parameter);
            let (parsed_cmd, parsed_param) = parse_packet(&packet).unwrap();
            assert_eq!(parsed_cmd, command);
            assert_eq!(parsed_param, parameter);
        }
    }

    #[test]
    fn parse_rejects_malformed_packets() {
        assert!(parse_packet(b"").is_err());
        assert!(parse_packet(b"JUNKJUNKJUNKJUNKJUNKJUNK").is_err());

        let mut truncated = build_packet("MVL", "QSTN");
        truncated.truncate(18);
        assert!(parse_packet(&truncated).is_err());

        // Valid header, data missing the !1 prefix
        let mut bad = build_packet("MVL", "UP");
        bad[16] = b'?';
        assert!(parse_packet(&bad).is_err());
    }

    #[test]
    fn volume_mapping_scales_and_clamps() {
        let clock = ManualClock::new(1_000);
        let volume = Mutex::new(VolumeState::new(80));

        // 0x28 = 40 raw = 50%
        handle_volume_parameter("28", &volume, &clock);
        let state = volume.lock().unwrap();
        assert_eq!(state.raw_level, 40);
        assert_eq!(state.level, 50);
        assert!(state.changed);
        assert_eq!(state.last_change_ns, 1_000);
    }

    #[test]
    fn not_available_parameter_is_ignored() {
        let clock = ManualClock::new(0);
        let volume = Mutex::new(VolumeState::new(80));
        handle_volume_parameter("N/A", &volume, &clock);
        assert!(!volume.lock().unwrap().changed);
    }

    #[test]
    fn unchanged_level_does_not_mark_changed() {
        let clock = ManualClock::new(0);
        let volume = Mutex::new(VolumeState::new(80));
        handle_volume_parameter("28", &volume, &clock);
        volume.lock().unwrap().changed = false;
        handle_volume_parameter("28", &volume, &clock);
        assert!(!volume.lock().unwrap().changed);
    }

    #[test]
    fn query_volume_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            // Read the query, answer with volume 0x32
            let mut buffer = [0u8; 64];
            let _ = socket.read(&mut buffer).unwrap();
            socket.write_all(&build_packet("MVL", "32")).unwrap();
        });

        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(7));
        let mut control = ReceiverControl::new(clock, 80);
        let config = ReceiverConfig {
            enabled: true,
            ip_address: address.ip().to_string(),
            port: address.port(),
            ..Default::default()
        };
        control.connect(&config).unwrap();

        let info = control.volume_info();
        assert_eq!(info.raw_level, 0x32);
        assert_eq!(info.level, 0x32 * 100 / 80);
        assert!(info.changed);
        server.join().unwrap();
        control.shutdown();
    }

    #[test]
    fn send_without_connection_fails() {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(0));
        let mut control = ReceiverControl::new(clock, 80);
        assert!(matches!(
            control.volume_up(),
            Err(Error::NotInitialized(_))
        ));
    }
}
