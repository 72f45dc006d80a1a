use serde::{Deserialize, Serialize};

use crate::snapshot::DeviceClass;

pub const DOOR_WORDS: &[&str] = &[
    "door", "porte", "puerta", "porta", "tür", "tuer", "deur", "dør", "dörr", "drzwi",
];

pub const WINDOW_WORDS: &[&str] = &[
    "window", "fenêtre", "fenetre", "ventana", "janela", "finestra", "fenster", "raam", "vindu",
    "fönster", "okno", "ikkuna",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorSubtype {
    ContactSensor,
    ContactShockSensor,
    MotionSensor,
    PanelMotionSensor,
    SmokeDetector,
    CoDetector,
    HeatDetector,
    PanicButton,
    FixedPanic,
    GlassBreakDetector,
    PanelGlassBreakDetector,
    FreezeSensor,
    WaterSensor,
    Siren,
    PanelImageSensor,
    MobilePhone,
    #[serde(other)]
    Other,
}

impl SensorSubtype {
    pub fn is_blacklisted(self) -> bool {
        matches!(
            self,
            Self::MobilePhone | Self::Siren | Self::PanelImageSensor | Self::FixedPanic
        )
    }

    pub fn is_contact(self) -> bool {
        matches!(self, Self::ContactSensor | Self::ContactShockSensor)
    }
}

// A window match replaces an earlier door match: "Door Window" is a window.
pub fn classify_contact(name: &str) -> Option<DeviceClass> {
    let name = name.to_lowercase();
    let mut derived = None;
    if DOOR_WORDS.iter().any(|word| name.contains(word)) {
        derived = Some(DeviceClass::Door);
    }
    if WINDOW_WORDS.iter().any(|word| name.contains(word)) {
        derived = Some(DeviceClass::Window);
    }
    derived
}

pub fn sensor_class(subtype: SensorSubtype, name: &str) -> Option<DeviceClass> {
    if subtype.is_contact() {
        return classify_contact(name);
    }

    match subtype {
        SensorSubtype::WaterSensor => Some(DeviceClass::Moisture),
        SensorSubtype::SmokeDetector | SensorSubtype::HeatDetector => Some(DeviceClass::Smoke),
        SensorSubtype::CoDetector => Some(DeviceClass::CarbonMonoxide),
        SensorSubtype::PanicButton => Some(DeviceClass::Safety),
        SensorSubtype::GlassBreakDetector | SensorSubtype::PanelGlassBreakDetector => {
            Some(DeviceClass::Vibration)
        }
        SensorSubtype::MotionSensor | SensorSubtype::PanelMotionSensor => Some(DeviceClass::Motion),
        SensorSubtype::FreezeSensor => Some(DeviceClass::Cold),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn door_and_window_names() {
        assert_eq!(classify_contact("Front Door"), Some(DeviceClass::Door));
        assert_eq!(classify_contact("Kitchen WINDOW"), Some(DeviceClass::Window));
        assert_eq!(classify_contact("Haustür"), Some(DeviceClass::Door));
        assert_eq!(classify_contact("Garage sensor"), None);
    }

    #[test]
    fn window_list_wins_when_both_match() {
        assert_eq!(classify_contact("Door by the window"), Some(DeviceClass::Window));
    }

    #[test]
    fn non_contact_subtypes_ignore_the_name() {
        assert_eq!(
            sensor_class(SensorSubtype::MotionSensor, "Back door hallway"),
            Some(DeviceClass::Motion)
        );
        assert_eq!(sensor_class(SensorSubtype::Other, "Door"), None);
    }
}
