//! Protocol types exchanged between the host and a module.
//!
//! ```text
//! host ──ModuleConf──► module ──ModuleConfOk / ModuleConfErr──► host
//! host ──ModuleReq───► module ──ModuleRes / ModuleErr─────────► host
//! ```
//!
//! The configuration handshake must complete before requests are served.
//! That ordering is enforced by handler logic, not by the framing layer.

/// Which side sends a packet of a given type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the host, received by the module.
    ToModule,
    /// Sent by the module, received by the host.
    ToHost,
}

/// Lifecycle phase a packet type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Configuration handshake.
    Configuration,
    /// Request/response traffic.
    Request,
}

/// Packet type code carried in header byte 6.
///
/// Codes outside the known set are kept as [`Proto::Unknown`] so a host
/// that adds packet kinds does not break the stream. Handlers decide what
/// to do with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Proto {
    /// Configuration data for the module.
    ModuleConf,
    /// Module accepted the configuration.
    ModuleConfOk,
    /// Module rejected the configuration.
    ModuleConfErr,
    /// A request, correlated by id.
    ModuleReq,
    /// Successful reply to a request.
    ModuleRes,
    /// Error reply to a request.
    ModuleErr,
    /// A type code this crate does not know.
    Unknown(u8),
}

impl Proto {
    /// Wire code of this type.
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            Proto::ModuleConf => 64,
            Proto::ModuleConfOk => 65,
            Proto::ModuleConfErr => 66,
            Proto::ModuleReq => 80,
            Proto::ModuleRes => 81,
            Proto::ModuleErr => 82,
            Proto::Unknown(code) => code,
        }
    }

    /// Check byte that must accompany this type on the wire.
    #[inline]
    pub fn checkbit(self) -> u8 {
        0xFF ^ self.code()
    }

    /// Returns `true` for the six protocol types.
    pub fn is_known(self) -> bool {
        !matches!(self, Proto::Unknown(_))
    }

    /// Direction this type travels in, `None` for unknown codes.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Proto::ModuleConf | Proto::ModuleReq => Some(Direction::ToModule),
            Proto::ModuleConfOk | Proto::ModuleConfErr | Proto::ModuleRes | Proto::ModuleErr => {
                Some(Direction::ToHost)
            }
            Proto::Unknown(_) => None,
        }
    }

    /// Lifecycle phase this type belongs to, `None` for unknown codes.
    pub fn phase(self) -> Option<Phase> {
        match self {
            Proto::ModuleConf | Proto::ModuleConfOk | Proto::ModuleConfErr => {
                Some(Phase::Configuration)
            }
            Proto::ModuleReq | Proto::ModuleRes | Proto::ModuleErr => Some(Phase::Request),
            Proto::Unknown(_) => None,
        }
    }

    /// Returns `true` if `reply` is a valid answer to a packet of this type.
    pub fn accepts_reply(self, reply: Proto) -> bool {
        matches!(
            (self, reply),
            (Proto::ModuleConf, Proto::ModuleConfOk)
                | (Proto::ModuleConf, Proto::ModuleConfErr)
                | (Proto::ModuleReq, Proto::ModuleRes)
                | (Proto::ModuleReq, Proto::ModuleErr)
        )
    }
}

impl From<u8> for Proto {
    fn from(code: u8) -> Self {
        match code {
            64 => Proto::ModuleConf,
            65 => Proto::ModuleConfOk,
            66 => Proto::ModuleConfErr,
            80 => Proto::ModuleReq,
            81 => Proto::ModuleRes,
            82 => Proto::ModuleErr,
            other => Proto::Unknown(other),
        }
    }
}

impl From<Proto> for u8 {
    fn from(tp: Proto) -> u8 {
        tp.code()
    }
}
