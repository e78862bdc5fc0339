//! L3: RPC framer.
//!
//! A length-prefixed request/response/event protocol over an abstract byte
//! transport, with an optional CRC trailer and a streaming unmarshal state
//! machine that resynchronises on bad input instead of wedging. Every
//! reservation the parser takes from `rx_queue` is either committed (on a
//! fully-parsed message) or released (on a parse failure) -- no byte of the
//! queue's backing buffer is ever left allocated with nothing pointing at it.

use crate::osal;
use crate::queue::{Queue, Reservation};
use crate::status::RpcError;

pub const SYNC_BYTES: u16 = 0xCAFE;
pub const HEADER_SIZE: usize = 12;
pub const DEFAULT_RECORD_TIMEOUT_MS: u32 = 3000;
pub const TICKS_PER_MS: u32 = 1;
pub const DEFAULT_NUM_RECORDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Req = 0,
    Resp = 1,
    Event = 2,
}

impl MsgType {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(MsgType::Req),
            1 => Some(MsgType::Resp),
            2 => Some(MsgType::Event),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MsgHeader {
    pub uuid: u16,
    pub msg_type: MsgType,
    pub encrypted: bool,
    pub cmd_id: u16,
    pub payload_size: u32,
}

impl MsgHeader {
    fn encode(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&SYNC_BYTES.to_be_bytes());
        out[2..4].copy_from_slice(&self.uuid.to_be_bytes());
        out[4] = self.msg_type as u8;
        out[5] = self.encrypted as u8;
        out[6..8].copy_from_slice(&self.cmd_id.to_be_bytes());
        out[8..12].copy_from_slice(&self.payload_size.to_be_bytes());
    }
}

fn decode_header(bytes: &[u8; HEADER_SIZE]) -> MsgHeader {
    MsgHeader {
        uuid: u16::from_be_bytes([bytes[2], bytes[3]]),
        msg_type: MsgType::from_u8(bytes[4]).unwrap_or(MsgType::Req),
        encrypted: bytes[5] != 0,
        cmd_id: u16::from_be_bytes([bytes[6], bytes[7]]),
        payload_size: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
    }
}

/// A command handler invoked with the parsed header and its payload.
pub type CommandHandler = fn(&MsgHeader, &[u8]);

pub struct Command {
    pub id: u16,
    pub handler: CommandHandler,
}

/// Reports a framing/dispatch error; `run` degrades to silent
/// resynchronisation without one installed.
pub type ErrorCallback = fn(RpcError);

/// CRC trailer handler. `crc_size` tells the framer how many trailing bytes
/// to expect before `verify` runs; the original hardcodes a 2-byte trailer,
/// kept here as the default but overridable by the handler.
pub trait CrcHandler: Send + Sync {
    fn crc_size(&self) -> u8 {
        2
    }
    fn calculate(&self, input: &[u8], out: &mut [u8]);
    fn verify(&self, input: &[u8], crc: &[u8]) -> bool;
}

/// Abstract byte transport. `receive` moving fewer bytes than requested
/// means "nothing more available right now", not an error.
pub trait Transport: Send + Sync {
    fn transmit(&self, data: &[u8]) -> usize;
    fn receive(&self, out: &mut [u8]) -> usize;
}

/// Maximum CRC trailer width this framer can buffer while verifying.
const MAX_CRC_BYTES: usize = 32;

#[derive(Clone, Copy)]
struct Record {
    uuid: u16,
    timestamp_ticks: u32,
    is_available: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum UnmarshalState {
    Sync,
    Uuid,
    MsgType,
    EncryptFlag,
    CmdId,
    PayloadSize,
    Payload,
    Crc,
}

/// One RPC endpoint: its tx/rx queues, the outstanding-request table, and
/// the streaming unmarshal state machine.
///
/// `ITEMS`/`BLOCKS` size each queue; `RECORDS` bounds how many requests can
/// be outstanding (awaiting a response) at once; `MAX_PAYLOAD` bounds the
/// scratch copy made of a payload while dispatching or transmitting.
pub struct RpcContext<
    const ITEMS: usize = 16,
    const BLOCKS: usize = 256,
    const RECORDS: usize = DEFAULT_NUM_RECORDS,
    const MAX_PAYLOAD: usize = 128,
> {
    tx_queue: Queue<ITEMS, BLOCKS>,
    rx_queue: Queue<ITEMS, BLOCKS>,
    commands: &'static [Command],
    next_uuid: u16,
    records: [Record; RECORDS],
    crc_handler: Option<&'static dyn CrcHandler>,
    error_callback: Option<ErrorCallback>,

    state: UnmarshalState,
    sync_acc: u16,
    byte_count: usize,
    header_bytes: [u8; HEADER_SIZE],
    header: Option<MsgHeader>,
    header_reservation: Option<Reservation>,
    payload_reservation: Option<Reservation>,
    crc_bytes: [u8; MAX_CRC_BYTES],
}

impl<const ITEMS: usize, const BLOCKS: usize, const RECORDS: usize, const MAX_PAYLOAD: usize>
    RpcContext<ITEMS, BLOCKS, RECORDS, MAX_PAYLOAD>
{
    pub const fn new(commands: &'static [Command]) -> Self {
        RpcContext {
            tx_queue: Queue::new(),
            rx_queue: Queue::new(),
            commands,
            next_uuid: 0,
            records: [Record { uuid: 0, timestamp_ticks: 0, is_available: true }; RECORDS],
            crc_handler: None,
            error_callback: None,
            state: UnmarshalState::Sync,
            sync_acc: 0,
            byte_count: 0,
            header_bytes: [0; HEADER_SIZE],
            header: None,
            header_reservation: None,
            payload_reservation: None,
            crc_bytes: [0; MAX_CRC_BYTES],
        }
    }

    pub fn create(&mut self, tx_buffer: &'static mut [u8], rx_buffer: &'static mut [u8]) -> bool {
        self.tx_queue.create(tx_buffer) && self.rx_queue.create(rx_buffer)
    }

    pub fn set_crc_handler(&mut self, handler: &'static dyn CrcHandler) {
        self.crc_handler = Some(handler);
    }

    pub fn set_error_callback(&mut self, cb: ErrorCallback) {
        self.error_callback = Some(cb);
    }

    pub fn pending_tx(&self) -> usize {
        self.tx_queue.num_elements()
    }

    pub fn pending_records(&self) -> usize {
        self.records.iter().filter(|r| !r.is_available).count()
    }

    fn crc_trailer_len(&self) -> usize {
        self.crc_handler.map_or(0, |h| h.crc_size() as usize)
    }

    fn report_error(&self, err: RpcError) {
        if let Some(cb) = self.error_callback {
            cb(err);
        }
    }

    fn alloc_record(&mut self, uuid: u16) -> bool {
        let now = osal::interface().map_or(0, |o| o.task_get_tick_count());
        for record in self.records.iter_mut() {
            if record.is_available {
                *record = Record { uuid, timestamp_ticks: now, is_available: false };
                return true;
            }
        }
        false
    }

    fn free_record(&mut self, uuid: u16) {
        for record in self.records.iter_mut() {
            if !record.is_available && record.uuid == uuid {
                record.is_available = true;
            }
        }
    }

    /// Allocates a record, marshals a request frame, and enqueues it on
    /// `tx_queue`. Returns the assigned uuid.
    pub fn create_request(&mut self, cmd_id: u16, payload: &[u8]) -> Result<u16, RpcError> {
        let uuid = self.next_uuid.wrapping_add(1);
        if !self.alloc_record(uuid) {
            return Err(RpcError::QueueReserveFailed);
        }
        self.next_uuid = uuid;
        match self.marshal(uuid, MsgType::Req, cmd_id, payload) {
            Ok(()) => Ok(uuid),
            Err(e) => {
                self.free_record(uuid);
                Err(e)
            }
        }
    }

    /// Marshals a response frame for `uuid` (taken from the inbound
    /// request, not from this endpoint's own record table).
    pub fn create_response(&mut self, cmd_id: u16, uuid: u16, payload: &[u8]) -> Result<(), RpcError> {
        self.marshal(uuid, MsgType::Resp, cmd_id, payload)
    }

    fn marshal(&mut self, uuid: u16, msg_type: MsgType, cmd_id: u16, payload: &[u8]) -> Result<(), RpcError> {
        let crc_len = self.crc_trailer_len();
        let total = HEADER_SIZE + payload.len() + crc_len;
        let mut reservation = self.tx_queue.reserve(total).ok_or(RpcError::QueueReserveFailed)?;
        {
            let buf = reservation.payload();
            let header = MsgHeader {
                uuid,
                msg_type,
                encrypted: false,
                cmd_id,
                payload_size: payload.len() as u32,
            };
            header.encode(&mut buf[..HEADER_SIZE]);
            buf[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);
            if let Some(handler) = self.crc_handler {
                handler.calculate(payload, &mut buf[HEADER_SIZE + payload.len()..total]);
            }
        }
        if !self.tx_queue.push_reserved(reservation) {
            return Err(RpcError::QueueReserveFailed);
        }
        Ok(())
    }

    /// Feeds one received byte into the streaming unmarshal state machine.
    pub fn unmarshal_byte(&mut self, byte: u8) {
        match self.state {
            UnmarshalState::Sync => {
                self.sync_acc = (self.sync_acc << 8) | byte as u16;
                self.byte_count += 1;
                if self.byte_count == 2 {
                    self.byte_count = 0;
                    if self.sync_acc == SYNC_BYTES {
                        match self.rx_queue.reserve(HEADER_SIZE) {
                            Some(r) => {
                                self.header_reservation = Some(r);
                                self.header_bytes = [0; HEADER_SIZE];
                                self.header_bytes[0..2].copy_from_slice(&SYNC_BYTES.to_be_bytes());
                                self.state = UnmarshalState::Uuid;
                            }
                            None => self.report_error(RpcError::QueueReserveFailed),
                        }
                    } else {
                        self.report_error(RpcError::WrongSyncBytes);
                    }
                }
            }
            UnmarshalState::Uuid => {
                self.header_bytes[2 + self.byte_count] = byte;
                self.byte_count += 1;
                if self.byte_count == 2 {
                    self.byte_count = 0;
                    self.state = UnmarshalState::MsgType;
                }
            }
            UnmarshalState::MsgType => {
                if MsgType::from_u8(byte).is_none() {
                    self.release_header();
                    self.report_error(RpcError::WrongMsgType);
                    self.reset_to_sync();
                    return;
                }
                self.header_bytes[4] = byte;
                self.state = UnmarshalState::EncryptFlag;
            }
            UnmarshalState::EncryptFlag => {
                self.header_bytes[5] = byte;
                self.state = UnmarshalState::CmdId;
            }
            UnmarshalState::CmdId => {
                self.header_bytes[6 + self.byte_count] = byte;
                self.byte_count += 1;
                if self.byte_count == 2 {
                    self.byte_count = 0;
                    self.state = UnmarshalState::PayloadSize;
                }
            }
            UnmarshalState::PayloadSize => {
                self.header_bytes[8 + self.byte_count] = byte;
                self.byte_count += 1;
                if self.byte_count == 4 {
                    self.byte_count = 0;
                    let header = decode_header(&self.header_bytes);
                    if header.payload_size == 0 {
                        self.header = Some(header);
                        if self.crc_trailer_len() > 0 {
                            self.state = UnmarshalState::Crc;
                        } else {
                            self.commit_message();
                            self.reset_to_sync();
                        }
                        return;
                    }
                    match self.rx_queue.reserve(header.payload_size as usize) {
                        Some(r) => {
                            self.payload_reservation = Some(r);
                            self.header = Some(header);
                            self.state = UnmarshalState::Payload;
                        }
                        None => {
                            self.release_header();
                            self.report_error(RpcError::QueueReserveFailed);
                            self.reset_to_sync();
                        }
                    }
                }
            }
            UnmarshalState::Payload => {
                let idx = self.byte_count;
                if let Some(reservation) = self.payload_reservation.as_mut() {
                    reservation.payload()[idx] = byte;
                }
                self.byte_count += 1;
                let payload_size = self.header.map_or(0, |h| h.payload_size as usize);
                if self.byte_count == payload_size {
                    self.byte_count = 0;
                    if self.crc_trailer_len() > 0 {
                        self.state = UnmarshalState::Crc;
                    } else {
                        self.commit_message();
                        self.reset_to_sync();
                    }
                }
            }
            UnmarshalState::Crc => {
                let idx = self.byte_count.min(MAX_CRC_BYTES - 1);
                self.crc_bytes[idx] = byte;
                self.byte_count += 1;
                if self.byte_count == self.crc_trailer_len() {
                    let ok = match (self.crc_handler, self.payload_reservation.as_mut()) {
                        (Some(handler), Some(reservation)) => {
                            handler.verify(reservation.payload(), &self.crc_bytes[..handler.crc_size() as usize])
                        }
                        (Some(_), None) => true,
                        (None, _) => true,
                    };
                    self.byte_count = 0;
                    if ok {
                        self.commit_message();
                    } else {
                        self.release_header();
                        self.release_payload();
                        self.report_error(RpcError::CrcFailed);
                    }
                    self.reset_to_sync();
                }
            }
        }
    }

    fn commit_message(&mut self) {
        if let Some(mut r) = self.header_reservation.take() {
            r.payload().copy_from_slice(&self.header_bytes);
            self.rx_queue.push_reserved(r);
        }
        if let Some(r) = self.payload_reservation.take() {
            self.rx_queue.push_reserved(r);
        }
    }

    fn release_header(&mut self) {
        if let Some(r) = self.header_reservation.take() {
            self.rx_queue.release_reserved(r);
        }
    }

    fn release_payload(&mut self) {
        if let Some(r) = self.payload_reservation.take() {
            self.rx_queue.release_reserved(r);
        }
    }

    fn reset_to_sync(&mut self) {
        self.state = UnmarshalState::Sync;
        self.byte_count = 0;
        self.sync_acc = 0;
        self.header = None;
    }

    fn dispatch_one(&mut self) {
        let Some(front) = self.rx_queue.get_front() else { return };
        let mut header_bytes = [0u8; HEADER_SIZE];
        header_bytes.copy_from_slice(&front[..HEADER_SIZE]);
        self.rx_queue.pop_front();
        let header = decode_header(&header_bytes);

        if header.msg_type == MsgType::Resp {
            let mut matched = false;
            for record in self.records.iter_mut() {
                if !record.is_available && record.uuid == header.uuid {
                    record.is_available = true;
                    matched = true;
                    break;
                }
            }
            if !matched {
                if header.payload_size > 0 {
                    self.rx_queue.pop_front();
                }
                return;
            }
        }

        let handler = self.commands.iter().find(|c| c.id == header.cmd_id).map(|c| c.handler);
        let mut scratch = [0u8; MAX_PAYLOAD];
        let len = if header.payload_size > 0 {
            self.rx_queue.get_front().map_or(0, |p| {
                let n = p.len().min(MAX_PAYLOAD);
                scratch[..n].copy_from_slice(&p[..n]);
                n
            })
        } else {
            0
        };

        match handler {
            Some(h) => h(&header, &scratch[..len]),
            None => self.report_error(RpcError::UnknownCmd),
        }

        if header.payload_size > 0 {
            self.rx_queue.pop_front();
        }
    }

    fn scan_record_timeouts(&mut self) {
        let now = osal::interface().map_or(0, |o| o.task_get_tick_count());
        let ticks_per_ms = TICKS_PER_MS.max(1);
        for record in self.records.iter_mut() {
            if !record.is_available {
                let elapsed_ms = now.wrapping_sub(record.timestamp_ticks) / ticks_per_ms;
                if elapsed_ms >= DEFAULT_RECORD_TIMEOUT_MS {
                    record.is_available = true;
                }
            }
        }
    }

    /// Pumps available input bytes through the unmarshaller, dispatches one
    /// fully parsed message if any, flushes one pending tx frame, and
    /// recycles timed-out records.
    pub fn run(&mut self, transport: &dyn Transport) {
        let mut byte = [0u8; 1];
        while transport.receive(&mut byte) == 1 {
            self.unmarshal_byte(byte[0]);
        }

        if !self.rx_queue.is_empty() {
            self.dispatch_one();
        }

        let transmitted = self
            .tx_queue
            .get_front()
            .map(|front| {
                transport.transmit(front);
            })
            .is_some();
        if transmitted {
            self.tx_queue.pop_front();
        }

        self.scan_record_timeouts();
    }
}
