//! Strongly-typed Maple Bus wire addresses.
//!
//! One address byte encodes the player port in bits 7–6, the main
//! peripheral flag in bit 5, and one sub-peripheral slot bit in the low
//! five bits. Constructors reject out-of-range input instead of silently
//! masking it.
use crate::error::AddressError;

/// Bit flagging the main peripheral in an address byte.
const MAIN_PERIPHERAL_BIT: u8 = 0x20;
/// Mask of the five sub-peripheral slot bits.
const SUB_SLOT_MASK: u8 = 0x1F;

//==================================================================================PLAYER_INDEX
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Player port number, 0 to 3.
pub struct PlayerIndex(u8);

impl PlayerIndex {
    /// Validating constructor.
    pub const fn new(index: u8) -> Result<Self, AddressError> {
        if index > 3 {
            return Err(AddressError::InvalidPlayerIndex { index });
        }
        Ok(Self(index))
    }

    /// Raw port number.
    pub const fn index(self) -> u8 {
        self.0
    }
}

//==================================================================================ROLE
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// What an address byte designates on its player port.
pub enum Role {
    /// The bus master on this port.
    Host,
    /// The directly plugged-in peripheral.
    Main,
    /// A daisy-chained accessory in slot 0..=4 under the main peripheral.
    Sub(u8),
}

//==================================================================================MAPLE_ADDRESS
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A single bus entity: player port plus role.
pub struct MapleAddress {
    player: PlayerIndex,
    role: Role,
}

impl MapleAddress {
    /// The bus master address of a player port.
    pub const fn host(player: PlayerIndex) -> Self {
        Self {
            player,
            role: Role::Host,
        }
    }

    /// The main peripheral address of a player port.
    pub const fn main_peripheral(player: PlayerIndex) -> Self {
        Self {
            player,
            role: Role::Main,
        }
    }

    /// A sub-peripheral address; `slot` must stay in 0..=4.
    pub const fn sub_peripheral(player: PlayerIndex, slot: u8) -> Result<Self, AddressError> {
        if slot > 4 {
            return Err(AddressError::InvalidSubSlot { slot });
        }
        Ok(Self {
            player,
            role: Role::Sub(slot),
        })
    }

    /// Owning player port.
    pub const fn player(self) -> PlayerIndex {
        self.player
    }

    /// Role on the port.
    pub const fn role(self) -> Role {
        self.role
    }

    /// Serialize to the wire byte.
    pub const fn to_byte(self) -> u8 {
        let port = self.player.0 << 6;
        match self.role {
            Role::Host => port,
            Role::Main => port | MAIN_PERIPHERAL_BIT,
            Role::Sub(slot) => port | (1 << slot),
        }
    }

    /// Strict decode of a recipient byte: exactly one entity, no
    /// sub-peripheral bits piggybacking on a main address.
    pub const fn from_byte(byte: u8) -> Result<Self, AddressError> {
        let player = match PlayerIndex::new(byte >> 6) {
            Ok(player) => player,
            Err(e) => return Err(e),
        };
        let low = byte & (MAIN_PERIPHERAL_BIT | SUB_SLOT_MASK);
        if low == 0 {
            return Ok(Self::host(player));
        }
        if low == MAIN_PERIPHERAL_BIT {
            return Ok(Self::main_peripheral(player));
        }
        if low & MAIN_PERIPHERAL_BIT == 0 && low.count_ones() == 1 {
            return Self::sub_peripheral(player, low.trailing_zeros() as u8);
        }
        Err(AddressError::InvalidAddressByte { byte })
    }

    /// Decode a sender byte.
    ///
    /// A main peripheral advertises its attached sub-peripherals by setting
    /// their slot bits in its own sender byte; the returned mask carries
    /// those bits (bit `n` = slot `n` attached). Host and sub senders must
    /// not set extra bits.
    pub const fn from_sender_byte(byte: u8) -> Result<(Self, u8), AddressError> {
        let player = match PlayerIndex::new(byte >> 6) {
            Ok(player) => player,
            Err(e) => return Err(e),
        };
        let low = byte & (MAIN_PERIPHERAL_BIT | SUB_SLOT_MASK);
        if low & MAIN_PERIPHERAL_BIT != 0 {
            return Ok((Self::main_peripheral(player), low & SUB_SLOT_MASK));
        }
        if low == 0 {
            return Ok((Self::host(player), 0));
        }
        if low.count_ones() == 1 {
            match Self::sub_peripheral(player, low.trailing_zeros() as u8) {
                Ok(addr) => return Ok((addr, 0)),
                Err(e) => return Err(e),
            }
        }
        Err(AddressError::AmbiguousSenderByte { byte })
    }
}
