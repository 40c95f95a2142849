//! Message dispatch table and per-message handlers.
//!
//! The table maps the 4-bit wire message id to a handler. It is populated
//! once at startup and never mutated afterwards; the event loop only reads
//! it. Handlers transform the request payload in place: whatever bytes they
//! leave in the buffer become the response payload.

use crate::driver::DriverControl;
use bytes::{Buf, BytesMut};
use dutd_protocol::MsgId;
use std::sync::Arc;

/// Slots in the dispatch table; message ids are 4-bit values.
const TABLE_SIZE: usize = 16;

/// Longest accepted program image name in an upload request.
const MAX_PROGRAM_NAME_LEN: usize = 255;

/// Nv-memory kind selecting EEPROM data staged in flash.
const NV_MEMORY_FLASH: u32 = 1;

/// What the event loop should do after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Send a response frame carrying the (possibly rewritten) payload.
    Reply,
    /// Send nothing; the request is dropped from the peer's perspective.
    NoReply,
}

/// A handler for one message kind.
pub trait MessageHandler: Send + Sync {
    /// Processes a request for the given radio. `payload` arrives holding
    /// the request bytes and leaves holding the response bytes.
    fn handle(&self, hw_index: u8, payload: &mut BytesMut) -> Outcome;
}

/// Immutable-after-init mapping from message id to handler.
pub struct DispatchTable {
    handlers: [Option<Box<dyn MessageHandler>>; TABLE_SIZE],
}

impl DispatchTable {
    /// Creates a table with no handlers registered.
    pub fn empty() -> Self {
        Self {
            handlers: std::array::from_fn(|_| None),
        }
    }

    /// Creates a table with the full standard message catalog registered.
    pub fn standard(driver: Arc<dyn DriverControl>) -> Self {
        let mut table = Self::empty();
        table.register(
            MsgId::Reset,
            Box::new(ResetHandler {
                driver: driver.clone(),
            }),
        );
        table.register(
            MsgId::UploadProgram,
            Box::new(UploadProgramHandler {
                driver: driver.clone(),
            }),
        );
        table.register(
            MsgId::LowLevelCommand,
            Box::new(FirmwareCommandHandler {
                driver: driver.clone(),
            }),
        );
        table.register(
            MsgId::DriverCommand,
            Box::new(DriverCommandHandler {
                driver: driver.clone(),
            }),
        );
        for msg in [
            MsgId::AddInterface,
            MsgId::RemoveInterface,
            MsgId::SetBss,
            MsgId::SetQos,
            MsgId::StopTraffic,
            MsgId::DriverFirmware,
            MsgId::PlatformFields,
        ] {
            table.register(
                msg,
                Box::new(CoreForwardHandler {
                    driver: driver.clone(),
                    msg,
                }),
            );
        }
        table.register(MsgId::PlatformCommand, Box::new(PlatformHandler { driver }));
        table
    }

    /// Registers a handler. Only called during table construction.
    pub fn register(&mut self, msg: MsgId, handler: Box<dyn MessageHandler>) {
        self.handlers[msg.id() as usize] = Some(handler);
    }

    /// Looks up the handler for a raw wire id. Returns `None` for the
    /// reserved id 0, out-of-range ids, and unregistered slots.
    pub fn get(&self, msg_id: u8) -> Option<&dyn MessageHandler> {
        if msg_id == 0 || msg_id as usize >= TABLE_SIZE {
            return None;
        }
        self.handlers[msg_id as usize].as_deref()
    }
}

/// Reset request parameters.
///
/// Three wire shapes: empty (bare restart), 8 bytes (legacy, implies a full
/// reset), 12 bytes (explicit `do_reset` flag). All fields little-endian.
#[derive(Debug, Clone, Copy)]
struct ResetParams {
    nv_memory_kind: u32,
    eeprom_size: u32,
    full_reset: bool,
}

impl ResetParams {
    fn parse(payload: &[u8]) -> Option<Self> {
        let mut buf = payload;
        match payload.len() {
            8 => Some(Self {
                nv_memory_kind: buf.get_u32_le(),
                eeprom_size: buf.get_u32_le(),
                full_reset: true,
            }),
            12 => {
                let nv_memory_kind = buf.get_u32_le();
                let eeprom_size = buf.get_u32_le();
                let full_reset = buf.get_u32_le() != 0;
                Some(Self {
                    nv_memory_kind,
                    eeprom_size,
                    full_reset,
                })
            }
            _ => None,
        }
    }
}

/// Stops and restarts the driver, optionally staging EEPROM data in flash.
struct ResetHandler {
    driver: Arc<dyn DriverControl>,
}

impl MessageHandler for ResetHandler {
    fn handle(&self, hw_index: u8, payload: &mut BytesMut) -> Outcome {
        let params = ResetParams::parse(payload);
        if params.is_none() && !payload.is_empty() {
            tracing::warn!("reset request with malformed {} byte payload", payload.len());
        }
        let full_reset = params.map(|p| p.full_reset).unwrap_or(false);

        // The stop/start cycle runs whether or not it reports success.
        if let Err(e) = self.driver.stop(full_reset) {
            tracing::warn!("driver stop failed: {}", e);
        }
        if let Err(e) = self.driver.start(full_reset) {
            tracing::warn!("driver start failed: {}", e);
        }

        if let Some(params) = params {
            if !self.driver.is_connected(hw_index) {
                tracing::warn!("no connection with hardware #{}", hw_index);
                return Outcome::NoReply;
            }
            if params.nv_memory_kind == NV_MEMORY_FLASH {
                if let Err(e) = self.driver.prepare_eeprom(hw_index, params.eeprom_size) {
                    tracing::warn!("failed to prepare EEPROM data in flash: {}", e);
                }
            }
        }

        payload.clear();
        Outcome::Reply
    }
}

/// Uploads the two program images named in the payload, separated by `\n`.
struct UploadProgramHandler {
    driver: Arc<dyn DriverControl>,
}

impl MessageHandler for UploadProgramHandler {
    fn handle(&self, hw_index: u8, payload: &mut BytesMut) -> Outcome {
        if !self.driver.is_connected(hw_index) {
            tracing::warn!("no connection with hardware #{}", hw_index);
            return Outcome::NoReply;
        }

        let Some(split) = payload.iter().position(|&b| b == b'\n') else {
            tracing::warn!("upload request without a name separator");
            return Outcome::NoReply;
        };
        let (first, second) = (&payload[..split], &payload[split + 1..]);
        if first.len() > MAX_PROGRAM_NAME_LEN || second.len() > MAX_PROGRAM_NAME_LEN {
            tracing::warn!(
                "program image names too long ({}, {})",
                first.len(),
                second.len()
            );
            return Outcome::NoReply;
        }
        let (Ok(first), Ok(second)) = (std::str::from_utf8(first), std::str::from_utf8(second))
        else {
            tracing::warn!("program image names are not valid UTF-8");
            return Outcome::NoReply;
        };

        for name in [first, second] {
            if let Err(e) = self.driver.upload_program(hw_index, name) {
                tracing::warn!("failed to upload program image '{}': {}", name, e);
                return Outcome::NoReply;
            }
        }

        payload.clear();
        Outcome::Reply
    }
}

/// Forwards a typed command to the driver core. The driver rewrites the
/// payload with its reply; on driver failure the reply is the zero-filled
/// request region, still sent at full length.
struct CoreForwardHandler {
    driver: Arc<dyn DriverControl>,
    msg: MsgId,
}

impl MessageHandler for CoreForwardHandler {
    fn handle(&self, hw_index: u8, payload: &mut BytesMut) -> Outcome {
        if !self.driver.is_connected(hw_index) {
            tracing::warn!("no connection with hardware #{}", hw_index);
            return Outcome::NoReply;
        }

        if let Err(e) = self.driver.core_command(self.msg, hw_index, payload) {
            tracing::warn!("failed to send {} command: {}", self.msg, e);
            payload.fill(0);
        }
        Outcome::Reply
    }
}

/// Sends a raw low-level firmware command block.
struct FirmwareCommandHandler {
    driver: Arc<dyn DriverControl>,
}

impl MessageHandler for FirmwareCommandHandler {
    fn handle(&self, hw_index: u8, payload: &mut BytesMut) -> Outcome {
        tracing::trace!("low-level command, {} bytes", payload.len());

        if !self.driver.is_connected(hw_index) {
            tracing::warn!("no connection with hardware #{}", hw_index);
            return Outcome::NoReply;
        }

        if let Err(e) = self.driver.firmware_command(hw_index, payload) {
            tracing::warn!("failed to send low-level command: {}", e);
            payload.fill(0);
        }
        Outcome::Reply
    }
}

/// Sends a raw driver command block.
struct DriverCommandHandler {
    driver: Arc<dyn DriverControl>,
}

impl MessageHandler for DriverCommandHandler {
    fn handle(&self, hw_index: u8, payload: &mut BytesMut) -> Outcome {
        if !self.driver.is_connected(hw_index) {
            tracing::warn!("no connection with hardware #{}", hw_index);
            return Outcome::NoReply;
        }

        if let Err(e) = self.driver.driver_command(hw_index, payload) {
            tracing::warn!("failed to send driver command: {}", e);
            payload.fill(0);
        }
        Outcome::Reply
    }
}

/// Sends a raw platform command block. Always answers; a driver failure
/// shrinks the response payload to zero length.
struct PlatformHandler {
    driver: Arc<dyn DriverControl>,
}

impl MessageHandler for PlatformHandler {
    fn handle(&self, hw_index: u8, payload: &mut BytesMut) -> Outcome {
        if let Err(e) = self.driver.platform_command(hw_index, payload) {
            tracing::warn!("failed to send platform command: {}", e);
            payload.clear();
        }
        Outcome::Reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, NullDriver};
    use std::sync::Mutex;

    /// Driver mock that records calls and fails on demand.
    #[derive(Default)]
    struct RecordingDriver {
        connected: bool,
        fail_commands: bool,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingDriver {
        fn connected() -> Self {
            Self {
                connected: true,
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                connected: true,
                fail_commands: true,
                ..Default::default()
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn command_result(&self) -> Result<(), DriverError> {
            if self.fail_commands {
                Err(DriverError::Rejected(-1))
            } else {
                Ok(())
            }
        }
    }

    impl DriverControl for RecordingDriver {
        fn is_connected(&self, _hw_index: u8) -> bool {
            self.connected
        }

        fn stop(&self, full_reset: bool) -> Result<(), DriverError> {
            self.record(format!("stop({})", full_reset));
            Ok(())
        }

        fn start(&self, full_reset: bool) -> Result<(), DriverError> {
            self.record(format!("start({})", full_reset));
            Ok(())
        }

        fn upload_program(&self, _hw_index: u8, name: &str) -> Result<(), DriverError> {
            self.record(format!("upload({})", name));
            self.command_result()
        }

        fn core_command(
            &self,
            msg: MsgId,
            _hw_index: u8,
            data: &mut [u8],
        ) -> Result<(), DriverError> {
            self.record(format!("core({})", msg));
            if !self.fail_commands {
                // Simulate the driver writing its reply over the request.
                data.fill(0x5A);
            }
            self.command_result()
        }

        fn firmware_command(&self, _hw_index: u8, _data: &mut [u8]) -> Result<(), DriverError> {
            self.record("firmware");
            self.command_result()
        }

        fn driver_command(&self, _hw_index: u8, _data: &mut [u8]) -> Result<(), DriverError> {
            self.record("driver");
            self.command_result()
        }

        fn platform_command(&self, _hw_index: u8, _data: &mut [u8]) -> Result<(), DriverError> {
            self.record("platform");
            self.command_result()
        }

        fn prepare_eeprom(&self, hw_index: u8, size: u32) -> Result<(), DriverError> {
            self.record(format!("prepare_eeprom({}, {})", hw_index, size));
            self.command_result()
        }
    }

    fn handle(
        table: &DispatchTable,
        msg: MsgId,
        payload: &[u8],
    ) -> (Outcome, BytesMut) {
        let mut buf = BytesMut::from(payload);
        let outcome = table.get(msg.id()).unwrap().handle(0, &mut buf);
        (outcome, buf)
    }

    #[test]
    fn test_standard_table_covers_catalog() {
        let table = DispatchTable::standard(Arc::new(NullDriver));
        for msg in MsgId::ALL {
            assert!(table.get(msg.id()).is_some(), "no handler for {}", msg);
        }
    }

    #[test]
    fn test_get_rejects_reserved_and_out_of_range() {
        let table = DispatchTable::standard(Arc::new(NullDriver));
        assert!(table.get(0).is_none());
        assert!(table.get(13).is_none());
        assert!(table.get(0xFF).is_none());
    }

    #[test]
    fn test_get_unregistered_slot() {
        // A table configured with only a couple of handlers: id 9 has no
        // entry even though it is a valid wire id.
        let driver: Arc<dyn DriverControl> = Arc::new(NullDriver);
        let mut table = DispatchTable::empty();
        table.register(
            MsgId::Reset,
            Box::new(ResetHandler {
                driver: driver.clone(),
            }),
        );
        table.register(
            MsgId::UploadProgram,
            Box::new(UploadProgramHandler { driver }),
        );

        assert!(table.get(MsgId::Reset.id()).is_some());
        assert!(table.get(9).is_none());
    }

    #[test]
    fn test_reset_without_params() {
        let driver = Arc::new(RecordingDriver::connected());
        let table = DispatchTable::standard(driver.clone());

        let (outcome, buf) = handle(&table, MsgId::Reset, &[]);
        assert_eq!(outcome, Outcome::Reply);
        assert!(buf.is_empty());
        assert_eq!(driver.calls(), vec!["stop(false)", "start(false)"]);
    }

    #[test]
    fn test_reset_legacy_params_force_full_reset() {
        let driver = Arc::new(RecordingDriver::connected());
        let table = DispatchTable::standard(driver.clone());

        let mut payload = Vec::new();
        payload.extend_from_slice(&NV_MEMORY_FLASH.to_le_bytes());
        payload.extend_from_slice(&4096u32.to_le_bytes());

        let (outcome, buf) = handle(&table, MsgId::Reset, &payload);
        assert_eq!(outcome, Outcome::Reply);
        assert!(buf.is_empty());
        assert_eq!(
            driver.calls(),
            vec!["stop(true)", "start(true)", "prepare_eeprom(0, 4096)"]
        );
    }

    #[test]
    fn test_reset_explicit_flag_skips_non_flash_staging() {
        let driver = Arc::new(RecordingDriver::connected());
        let table = DispatchTable::standard(driver.clone());

        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_le_bytes()); // eeprom kind
        payload.extend_from_slice(&4096u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes()); // do_reset = false

        let (outcome, _) = handle(&table, MsgId::Reset, &payload);
        assert_eq!(outcome, Outcome::Reply);
        assert_eq!(driver.calls(), vec!["stop(false)", "start(false)"]);
    }

    #[test]
    fn test_reset_disconnected_with_params_rejects() {
        let driver = Arc::new(RecordingDriver::default());
        let table = DispatchTable::standard(driver.clone());

        let mut payload = Vec::new();
        payload.extend_from_slice(&NV_MEMORY_FLASH.to_le_bytes());
        payload.extend_from_slice(&64u32.to_le_bytes());

        let (outcome, _) = handle(&table, MsgId::Reset, &payload);
        assert_eq!(outcome, Outcome::NoReply);
        // The restart cycle still ran.
        assert_eq!(driver.calls(), vec!["stop(true)", "start(true)"]);
    }

    #[test]
    fn test_upload_program_splits_names() {
        let driver = Arc::new(RecordingDriver::connected());
        let table = DispatchTable::standard(driver.clone());

        let (outcome, buf) = handle(&table, MsgId::UploadProgram, b"alpha.bin\nbeta.bin");
        assert_eq!(outcome, Outcome::Reply);
        assert!(buf.is_empty());
        assert_eq!(
            driver.calls(),
            vec!["upload(alpha.bin)", "upload(beta.bin)"]
        );
    }

    #[test]
    fn test_upload_program_missing_separator() {
        let driver = Arc::new(RecordingDriver::connected());
        let table = DispatchTable::standard(driver.clone());

        let (outcome, _) = handle(&table, MsgId::UploadProgram, b"just-one-name");
        assert_eq!(outcome, Outcome::NoReply);
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_upload_program_name_too_long() {
        let driver = Arc::new(RecordingDriver::connected());
        let table = DispatchTable::standard(driver.clone());

        let mut payload = vec![b'a'; MAX_PROGRAM_NAME_LEN + 1];
        payload.push(b'\n');
        payload.push(b'b');

        let (outcome, _) = handle(&table, MsgId::UploadProgram, &payload);
        assert_eq!(outcome, Outcome::NoReply);
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_upload_program_failure_rejects() {
        let driver = Arc::new(RecordingDriver::failing());
        let table = DispatchTable::standard(driver.clone());

        let (outcome, _) = handle(&table, MsgId::UploadProgram, b"a\nb");
        assert_eq!(outcome, Outcome::NoReply);
        assert_eq!(driver.calls(), vec!["upload(a)"]);
    }

    #[test]
    fn test_forward_rewrites_payload() {
        let driver = Arc::new(RecordingDriver::connected());
        let table = DispatchTable::standard(driver.clone());

        let (outcome, buf) = handle(&table, MsgId::SetBss, b"\x01\x02\x03");
        assert_eq!(outcome, Outcome::Reply);
        assert_eq!(buf.as_ref(), &[0x5A, 0x5A, 0x5A]);
        assert_eq!(driver.calls(), vec!["core(set-bss)"]);
    }

    #[test]
    fn test_forward_failure_zero_fills_payload() {
        let driver = Arc::new(RecordingDriver::failing());
        let table = DispatchTable::standard(driver.clone());

        let (outcome, buf) = handle(&table, MsgId::AddInterface, b"\x01\x02\x03");
        assert_eq!(outcome, Outcome::Reply);
        assert_eq!(buf.as_ref(), &[0, 0, 0]);
    }

    #[test]
    fn test_forward_disconnected_rejects() {
        let driver = Arc::new(RecordingDriver::default());
        let table = DispatchTable::standard(driver.clone());

        let (outcome, _) = handle(&table, MsgId::StopTraffic, b"\x01");
        assert_eq!(outcome, Outcome::NoReply);
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_platform_failure_answers_empty() {
        let driver = Arc::new(RecordingDriver::failing());
        let table = DispatchTable::standard(driver.clone());

        let (outcome, buf) = handle(&table, MsgId::PlatformCommand, b"\x01\x02");
        assert_eq!(outcome, Outcome::Reply);
        assert!(buf.is_empty());
        assert_eq!(driver.calls(), vec!["platform"]);
    }
}
