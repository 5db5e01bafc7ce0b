//! Traffic lamp head on three GPIO outputs.

use embedded_hal::digital::{OutputPin, PinState};
use log::warn;

use crate::app::ports::{Colour, LampPort};

/// Red, yellow and green lenses, one active-high output each.  At most one
/// lens is lit.
pub struct PinLamp<R, Y, G> {
    red: R,
    yellow: Y,
    green: G,
}

impl<R: OutputPin, Y: OutputPin, G: OutputPin> PinLamp<R, Y, G> {
    pub fn new(red: R, yellow: Y, green: G) -> Self {
        Self { red, yellow, green }
    }
}

impl<R: OutputPin, Y: OutputPin, G: OutputPin> LampPort for PinLamp<R, Y, G> {
    fn show(&mut self, colour: Colour) {
        let lit = |c: Colour| PinState::from(colour == c);
        // Darken before lighting so two lenses are never on together.
        let ok = [
            self.red.set_state(PinState::Low).is_ok(),
            self.yellow.set_state(PinState::Low).is_ok(),
            self.green.set_state(PinState::Low).is_ok(),
            self.red.set_state(lit(Colour::Red)).is_ok(),
            self.yellow.set_state(lit(Colour::Yellow)).is_ok(),
            self.green.set_state(lit(Colour::Green)).is_ok(),
        ];
        if ok.contains(&false) {
            warn!("lamp: pin write failed showing {colour}");
        }
    }
}
