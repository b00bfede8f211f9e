use std::collections::VecDeque;
use std::str::FromStr;

use crate::error::{GeolocationError, SettingError};
use crate::geo::Coordinate;

/// Identifies one asynchronous request issued by the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket(pub u64);

/// Result of a one-shot position request
#[derive(Clone, Debug, PartialEq)]
pub struct PositionUpdate {
    pub ticket: Ticket,
    pub result: Result<Coordinate, GeolocationError>,
}

/// A host capability that can locate the device.
///
/// Requests are one-shot and complete later; the page polls for finished
/// requests on its own event loop.
pub trait GeolocationProvider {
    fn request_current_position(&mut self, ticket: Ticket);

    fn poll_position(&mut self) -> Option<PositionUpdate>;
}

/// Answers every request on the next poll with the same fix or failure.
#[derive(Debug)]
pub struct FixedGeolocation {
    answer: Result<Coordinate, GeolocationError>,
    pending: VecDeque<Ticket>,
}

impl FixedGeolocation {
    pub fn at(position: Coordinate) -> Self {
        Self { answer: Ok(position), pending: VecDeque::new() }
    }

    pub fn failing(error: GeolocationError) -> Self {
        Self { answer: Err(error), pending: VecDeque::new() }
    }
}

impl GeolocationProvider for FixedGeolocation {
    fn request_current_position(&mut self, ticket: Ticket) {
        self.pending.push_back(ticket);
    }

    fn poll_position(&mut self) -> Option<PositionUpdate> {
        let ticket = self.pending.pop_front()?;
        Some(PositionUpdate { ticket, result: self.answer })
    }
}

/// How the host locates the device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GeolocationSetting {
    /// The host has no geolocation capability at all.
    Unavailable,
    Fixed(Coordinate),
    Failing(GeolocationError),
}

impl GeolocationSetting {
    pub fn provider(&self) -> Option<Box<dyn GeolocationProvider>> {
        match *self {
            GeolocationSetting::Unavailable => None,
            GeolocationSetting::Fixed(at) => Some(Box::new(FixedGeolocation::at(at))),
            GeolocationSetting::Failing(err) => Some(Box::new(FixedGeolocation::failing(err))),
        }
    }
}

impl FromStr for GeolocationSetting {
    type Err = SettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unavailable" | "none" => Ok(GeolocationSetting::Unavailable),
            "denied" => Ok(GeolocationSetting::Failing(GeolocationError::PermissionDenied)),
            "position-unavailable" => Ok(GeolocationSetting::Failing(GeolocationError::PositionUnavailable)),
            "timeout" => Ok(GeolocationSetting::Failing(GeolocationError::Timeout)),
            other => other
                .parse::<Coordinate>()
                .map(GeolocationSetting::Fixed)
                .map_err(|source| SettingError::Geolocation { value: other.to_string(), source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_provider_answers_in_request_order() {
        let at = Coordinate::new(38.76, 9.04).unwrap();
        let mut geo = FixedGeolocation::at(at);
        assert_eq!(geo.poll_position(), None);

        geo.request_current_position(Ticket(1));
        geo.request_current_position(Ticket(2));
        assert_eq!(geo.poll_position(), Some(PositionUpdate { ticket: Ticket(1), result: Ok(at) }));
        assert_eq!(geo.poll_position().map(|u| u.ticket), Some(Ticket(2)));
        assert_eq!(geo.poll_position(), None);
    }

    #[test]
    fn parses_settings() {
        assert_eq!("unavailable".parse::<GeolocationSetting>(), Ok(GeolocationSetting::Unavailable));
        assert_eq!(
            "denied".parse::<GeolocationSetting>(),
            Ok(GeolocationSetting::Failing(GeolocationError::PermissionDenied))
        );
        assert!(matches!("38.76,9.04".parse::<GeolocationSetting>(), Ok(GeolocationSetting::Fixed(_))));
        assert!(matches!(
            "somewhere".parse::<GeolocationSetting>(),
            Err(SettingError::Geolocation { value, .. }) if value == "somewhere"
        ));
        assert!(GeolocationSetting::Unavailable.provider().is_none());
    }
}
