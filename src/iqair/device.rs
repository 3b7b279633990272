/// Static description of where the device is installed. Not part of the data
/// exported by the device itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub placement: String,

    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,

    pub placement: String,

    pub location: String,

    pub external: bool,
}

impl Device {
    pub fn new(name: impl Into<String>, metadata: &DeviceMetadata, is_indoor: bool) -> Self {
        Self {
            name: name.into(),
            placement: metadata.placement.clone(),
            location: metadata.location.clone(),
            external: !is_indoor,
        }
    }
}
