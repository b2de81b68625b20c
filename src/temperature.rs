pub const UNIT_CELSIUS: &str = "°C";
pub const DEVICE_CLASS_TEMPERATURE: &str = "temperature";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemperatureUnits {
    Celsius,
    /// What the clock reports once the fixed offset is applied
    CelsiusTimes10,
}

impl TemperatureUnits {
    fn factor(&self) -> f64 {
        match self {
            Self::CelsiusTimes10 => 10.,
            Self::Celsius => 1.,
        }
    }
}

impl std::fmt::Display for TemperatureUnits {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Celsius => fmt.write_str(UNIT_CELSIUS),
            Self::CelsiusTimes10 => write!(fmt, "{UNIT_CELSIUS}*10"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureValue {
    unit: TemperatureUnits,
    value: f64,
}

impl std::fmt::Display for TemperatureValue {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let normalized = self.normalize();
        write!(fmt, "{}{}", normalized.value, normalized.unit)
    }
}

impl TemperatureValue {
    pub fn new(value: f64, unit: TemperatureUnits) -> Self {
        Self { value, unit }
    }

    /// Wrap an already offset reading, in tenths of a degree
    pub fn with_tenths(value: i64) -> Self {
        Self::new(value as f64, TemperatureUnits::CelsiusTimes10)
    }

    /// Normalize away scaled temperature units
    pub fn normalize(&self) -> Self {
        Self::new(self.value / self.unit.factor(), TemperatureUnits::Celsius)
    }

    /// Degrees celsius, rounded to a single decimal place
    pub fn as_celsius(&self) -> f64 {
        (self.normalize().value * 10.).round() / 10.
    }

    /// The text published as sensor state
    pub fn state_value(&self) -> String {
        format!("{:.1}", self.as_celsius())
    }
}
