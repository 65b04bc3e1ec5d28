//! C7 — Command Bus: the framed request/response protocol with a
//! registration table (spec section 4.7). The catalog of ids is closed
//! and numerically stable (spec section 6); the dispatch table is a
//! plain array indexed by [`CommandId::index`] (spec section 9, "fits a
//! static array indexed by id").

use parking_lot::Mutex;
use tracing::warn;

use t1c_comms::catalog::{CommandId, CATALOG_LEN};
use t1c_comms::packet::{CommandKind, PayloadType};

use crate::error::Result;

pub type GetHandler = Box<dyn Fn(CommandId) -> Result<(PayloadType, Vec<u8>)> + Send + Sync>;
pub type SetHandler = Box<dyn Fn(CommandId, &[u8]) -> Result<()> + Send + Sync>;
pub type RspHandler = Box<dyn Fn(CommandId, &[u8]) -> Result<()> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no handler registered for {id:?}/{kind:?}")]
    NoHandler { id: CommandId, kind: CommandKind },
    #[error("handler for {id:?} failed: {0}")]
    HandlerFailed(#[source] crate::error::T1cError),
}

#[derive(Default)]
struct HandlerSlot {
    get: Option<GetHandler>,
    set: Option<SetHandler>,
    rsp: Option<RspHandler>,
}

enum BusMode {
    /// `send` short-circuits straight back into `dispatch` (spec section 4.7).
    Local,
    /// `send` hands the encoded packet off to a transport's outbound channel.
    Remote(crossbeam_channel::Sender<Vec<u8>>),
}

/// The registration table plus local/remote send routing.
pub struct CommandBus {
    mode: BusMode,
    table: Vec<Mutex<HandlerSlot>>,
}

impl CommandBus {
    pub fn init_local() -> Self {
        Self {
            mode: BusMode::Local,
            table: (0..CATALOG_LEN).map(|_| Mutex::new(HandlerSlot::default())).collect(),
        }
    }

    pub fn init_remote(sender: crossbeam_channel::Sender<Vec<u8>>) -> Self {
        Self {
            mode: BusMode::Remote(sender),
            table: (0..CATALOG_LEN).map(|_| Mutex::new(HandlerSlot::default())).collect(),
        }
    }

    /// Register any of the three handler kinds for `id`; `None` leaves an
    /// existing registration for that kind untouched only on the very
    /// first call (subsequent calls always replace).
    pub fn register(&self, id: CommandId, get: Option<GetHandler>, set: Option<SetHandler>, rsp: Option<RspHandler>) {
        let mut slot = self.table[id.index()].lock();
        if get.is_some() {
            slot.get = get;
        }
        if set.is_some() {
            slot.set = set;
        }
        if rsp.is_some() {
            slot.rsp = rsp;
        }
    }

    /// Invoke the registered get handler directly and return its encoded
    /// payload, without touching the transport. Local callers (and tests)
    /// that want the value itself, rather than a routed response packet,
    /// use this instead of `dispatch`.
    pub fn get(&self, id: CommandId) -> std::result::Result<(PayloadType, Vec<u8>), DispatchError> {
        let slot = self.table[id.index()].lock();
        match &slot.get {
            Some(h) => h(id).map_err(DispatchError::HandlerFailed),
            None => {
                warn!(?id, "get: no get handler registered");
                Err(DispatchError::NoHandler { id, kind: CommandKind::Get })
            }
        }
    }

    /// Route an inbound `(kind, id, payload)` to its registered handler.
    /// A missing handler is a protocol violation (spec section 7): logged
    /// and reported to the caller, never fatal to the bus. A successful
    /// `Get` in remote mode also pushes the handler's payload back out as
    /// a `{response, id, payload}` packet (spec section 4.7's get/set
    /// contract) since the inbound request itself carries no return path.
    pub fn dispatch(&self, kind: CommandKind, id: CommandId, payload: &[u8]) -> std::result::Result<(), DispatchError> {
        let slot = self.table[id.index()].lock();
        match kind {
            CommandKind::Get => match &slot.get {
                Some(h) => {
                    let (payload_type, bytes) = h(id).map_err(DispatchError::HandlerFailed)?;
                    if let BusMode::Remote(sender) = &self.mode {
                        let packet = t1c_comms::packet::encode(CommandKind::Response, id, payload_type, &bytes);
                        let _ = sender.try_send(packet);
                    }
                    Ok(())
                }
                None => {
                    warn!(?id, "dispatch: no get handler registered");
                    Err(DispatchError::NoHandler { id, kind })
                }
            },
            CommandKind::Set => match &slot.set {
                Some(h) => h(id, payload).map_err(DispatchError::HandlerFailed),
                None => {
                    warn!(?id, "dispatch: no set handler registered");
                    Err(DispatchError::NoHandler { id, kind })
                }
            },
            CommandKind::Response => match &slot.rsp {
                Some(h) => h(id, payload).map_err(DispatchError::HandlerFailed),
                None => {
                    warn!(?id, "dispatch: no response handler registered");
                    Err(DispatchError::NoHandler { id, kind })
                }
            },
        }
    }

    /// Encode `(kind, id, payload)` into a wire packet and route it: in
    /// local mode, straight back through `dispatch`; in remote mode, to
    /// the transport's outbound channel (spec section 4.7).
    pub fn send(&self, kind: CommandKind, id: CommandId, payload_type: PayloadType, payload: &[u8]) -> std::result::Result<(), DispatchError> {
        match &self.mode {
            BusMode::Local => self.dispatch(kind, id, payload),
            BusMode::Remote(sender) => {
                let packet = t1c_comms::packet::encode(kind, id, payload_type, payload);
                sender.try_send(packet).map_err(|_| {
                    warn!(?id, "send: outbound queue full, packet dropped");
                    DispatchError::NoHandler { id, kind }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn dispatch_without_handler_is_reported_not_fatal() {
        let bus = CommandBus::init_local();
        let err = bus.dispatch(CommandKind::Get, CommandId::BattLevel, &[]).unwrap_err();
        assert!(matches!(err, DispatchError::NoHandler { .. }));
    }

    #[test]
    fn local_send_short_circuits_to_dispatch() {
        let bus = CommandBus::init_local();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        bus.register(
            CommandId::Ffc,
            None,
            Some(Box::new(move |_id, _payload| {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
            None,
        );
        bus.send(CommandKind::Set, CommandId::Ffc, PayloadType::None, &[]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remote_send_enqueues_encoded_packet() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let bus = CommandBus::init_remote(tx);
        bus.send(CommandKind::Get, CommandId::SysInfo, PayloadType::None, &[]).unwrap();
        let packet = rx.try_recv().unwrap();
        let (header, _) = t1c_comms::packet::decode(&packet).unwrap();
        assert_eq!(header.id, CommandId::SysInfo);
        assert_eq!(header.kind, CommandKind::Get);
    }

    #[test]
    fn remote_send_drops_when_queue_full() {
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let bus = CommandBus::init_remote(tx);
        bus.send(CommandKind::Get, CommandId::SysInfo, PayloadType::None, &[]).unwrap();
        let err = bus.send(CommandKind::Get, CommandId::SysInfo, PayloadType::None, &[]).unwrap_err();
        assert!(matches!(err, DispatchError::NoHandler { .. }));
    }
}
