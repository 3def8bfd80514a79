//! Instructions from the connection state machine to its driver.
//!
//! The state machine owns no sockets and no key material. Each operation
//! returns a list of [`Directive`]s that the driver carries out in order.

use crate::frames::Frame;
use crate::types::Epoch;

/// Frames to be sealed into one packet at `epoch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub epoch: Epoch,
    pub frames: Vec<Frame>,
}

impl OutboundPacket {
    pub fn new(epoch: Epoch, frames: Vec<Frame>) -> Self {
        Self { epoch, frames }
    }

    pub fn empty(epoch: Epoch) -> Self {
        Self::new(epoch, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Switch the destination connection ID to the one the peer chose
    UpdateDcid,
    /// Seal and send these packets
    EmitPackets(Vec<OutboundPacket>),
    /// Hand a frame to the layer above
    ForwardFrame(Frame),
    /// Discard both key directions of an epoch
    DropKeys(Epoch),
    /// Packets queued for an epoch may now be sent
    AllowBufferedFlush(Epoch),
    /// The handshake finished; attach the stream layer
    InstallStreamMuxer,
    /// Tear the connection down
    Disconnect,
    /// No action required
    DoNothing,
}

impl Directive {
    pub fn emit(epoch: Epoch, frames: Vec<Frame>) -> Self {
        Directive::EmitPackets(vec![OutboundPacket::new(epoch, frames)])
    }

    pub fn is_emit(&self) -> bool {
        matches!(self, Directive::EmitPackets(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Directive::UpdateDcid => "update_dcid",
            Directive::EmitPackets(_) => "emit_packets",
            Directive::ForwardFrame(_) => "forward_frame",
            Directive::DropKeys(_) => "drop_keys",
            Directive::AllowBufferedFlush(_) => "allow_buffered_flush",
            Directive::InstallStreamMuxer => "install_stream_muxer",
            Directive::Disconnect => "disconnect",
            Directive::DoNothing => "do_nothing",
        }
    }
}
