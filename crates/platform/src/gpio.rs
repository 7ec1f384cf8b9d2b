//! Switch and pin abstraction layer
//!
//! The recorder reads three panel inputs — start, stop, and the socket's
//! card-detect contact. All three are plain digital lines behind the
//! [`Switch`] trait; the board crate decides which pins they live on.

use embedded_hal::digital::InputPin;

/// Pin state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinState {
    /// High (logic 1)
    High,
    /// Low (logic 0)
    Low,
}

impl From<bool> for PinState {
    fn from(value: bool) -> Self {
        if value {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl From<PinState> for bool {
    fn from(value: PinState) -> Self {
        matches!(value, PinState::High)
    }
}

/// A momentary switch or contact, reported as closed/open.
///
/// "Closed" means the switch is actuated: a pressed button, or a card seated
/// in the socket for the detect contact. Electrical polarity is the
/// implementor's concern — see [`ActiveLow`].
pub trait Switch {
    /// `true` while the switch is closed.
    fn is_closed(&mut self) -> bool;
}

/// [`Switch`] over a pulled-up input pin that reads low when closed.
///
/// Matches the usual wiring: switch between pin and ground, pull-up keeps
/// the line high while open. A pin read error is reported as "open" — the
/// recorder treats a dead detect line the same as a missing card.
pub struct ActiveLow<P> {
    pin: P,
}

impl<P: InputPin> ActiveLow<P> {
    /// Wrap a pulled-up input pin.
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    /// Release the wrapped pin.
    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: InputPin> Switch for ActiveLow<P> {
    fn is_closed(&mut self) -> bool {
        self.pin.is_low().unwrap_or(false)
    }
}
