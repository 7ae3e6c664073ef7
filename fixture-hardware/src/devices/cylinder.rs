use super::DeviceId;

/// Composite actuator: `on/off/stop` fan out to every member in order.
///
/// Members are appended through bindings whose source is the cylinder, so a
/// dual-valve cylinder is declared once and bound to both of its valves.
#[derive(Debug, Default)]
pub struct Cylinder {
    members: Vec<DeviceId>,
}

impl Cylinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, member: DeviceId) {
        self.members.push(member);
    }

    pub fn unbind(&mut self) {
        self.members.clear();
    }

    pub fn members(&self) -> &[DeviceId] {
        &self.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_keep_registration_order() {
        let mut cylinder = Cylinder::new();
        cylinder.bind(DeviceId(4));
        cylinder.bind(DeviceId(1));
        cylinder.bind(DeviceId(4));
        assert_eq!(cylinder.members(), &[DeviceId(4), DeviceId(1), DeviceId(4)]);

        cylinder.unbind();
        assert!(cylinder.members().is_empty());
    }
}
