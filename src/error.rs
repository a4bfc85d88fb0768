//! Unified error types for the motor node firmware.
//!
//! Every subsystem has its own small `Copy` error enum; the top-level
//! [`Error`] wraps them so bring-up and the firmware entry point can use a
//! single type.  None of these are fatal: each kind has a local recovery
//! (retry, drop-and-continue, or supervised driver restart).

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The CAN transport failed.
    Transport(TransportError),
    /// The motor actuator failed.
    Actuator(ActuatorError),
    /// The quadrature encoder failed.
    Encoder(EncoderError),
    /// Configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Encoder(e) => write!(f, "encoder: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The medium could not be installed or started.
    DriverInit,
    /// No frame (receive) or no TX slot (send) within the timeout.
    Timeout,
    /// A matching frame arrived with fewer than 2 payload bytes.
    Malformed,
    /// The medium rejected the frame for transmission.
    Busy,
    /// The transport is closed or the medium has left the running state.
    NotRunning,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DriverInit => write!(f, "CAN driver init failed"),
            Self::Timeout => write!(f, "timed out"),
            Self::Malformed => write!(f, "malformed frame"),
            Self::Busy => write!(f, "transmit rejected"),
            Self::NotRunning => write!(f, "bus not running"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Raw failure reported by a [`CanMedium`](crate::app::ports::CanMedium)
/// implementation.  The transport maps these onto [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumError {
    /// The blocking call ran out of time.
    Timeout,
    /// The driver is not installed, not started, or bus-off.
    InvalidState,
    /// Any other driver failure, with the platform error code.
    Failed(i32),
}

impl fmt::Display for MediumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::InvalidState => write!(f, "invalid driver state"),
            Self::Failed(rc) => write!(f, "driver error (rc={})", rc),
        }
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// The PWM or direction peripheral could not be configured.
    ConfigFailed,
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
    /// Direction GPIO write failed.
    GpioWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigFailed => write!(f, "PWM/GPIO config failed"),
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
        }
    }
}

impl std::error::Error for ActuatorError {}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Encoder errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderError {
    /// The pulse counter unit or its channels could not be configured.
    InitFailed(i32),
    /// Reading or clearing the counter failed.
    ReadFailed(i32),
}

impl fmt::Display for EncoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed(rc) => write!(f, "pulse counter init failed (rc={})", rc),
            Self::ReadFailed(rc) => write!(f, "pulse counter read failed (rc={})", rc),
        }
    }
}

impl std::error::Error for EncoderError {}

impl From<EncoderError> for Error {
    fn from(e: EncoderError) -> Self {
        Self::Encoder(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The JSON document could not be parsed.
    Parse,
    /// A field failed range validation.  The `&'static str` names it.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "config parse failed"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
