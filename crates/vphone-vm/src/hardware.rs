//! The modeled device: hardware model descriptor and fixed display.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hardware model descriptor handed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareModel {
    pub platform_version: u32,
    pub board_id: u32,
    pub isa: i64,
}

impl HardwareModel {
    /// Research iPhone platform (PV=3, board 0x90, ISA 2).
    pub const VRESEARCH101: HardwareModel = HardwareModel {
        platform_version: 3,
        board_id: 0x90,
        isa: 2,
    };
}

impl fmt::Display for HardwareModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PV={} (board {:#x}, ISA {})",
            self.platform_version, self.board_id, self.isa
        )
    }
}

/// Display attached to the guest. Fixed to the modeled panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicsDevice {
    pub width_in_pixels: u32,
    pub height_in_pixels: u32,
    pub pixels_per_inch: u32,
}

impl GraphicsDevice {
    pub const VRESEARCH101_PANEL: GraphicsDevice = GraphicsDevice {
        width_in_pixels: 1290,
        height_in_pixels: 2796,
        pixels_per_inch: 460,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            HardwareModel::VRESEARCH101.to_string(),
            "PV=3 (board 0x90, ISA 2)"
        );
    }
}
