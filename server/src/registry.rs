//! The bounded player-slot arena.
//!
//! A fixed array of seats indexed by a stable `u8`. Slots are allocated on a
//! successful join handshake and deallocated (never removed) on leave, drop
//! or kick; the index is the addressing unit for all unicast and broadcast
//! routing for the lifetime of the session. Allocation and deallocation are
//! the only mutations this type performs on the array shape.

use std::time::Instant;

use shared::{NetLink, PlayerInfo, MAX_CONNECTED_PLAYERS, MAX_NAME_LEN, NET_HOST_SLOT};

/// One seat: the player fields plus, for remote players, the connection that
/// feeds it. The host's own slot and not-yet-joined or AI-controlled seats
/// carry no connection.
pub struct PlayerSlot {
    pub info: PlayerInfo,
    pub link: Option<NetLink>,
    /// Last time any bytes arrived from this slot's connection.
    pub last_traffic: Instant,
}

impl PlayerSlot {
    fn empty() -> Self {
        PlayerSlot {
            info: PlayerInfo::default(),
            link: None,
            last_traffic: Instant::now(),
        }
    }
}

pub struct PlayerRegistry {
    slots: Vec<PlayerSlot>,
}

impl PlayerRegistry {
    /// Initializes all seats and allocates the host into slot 0.
    pub fn new(host_name: &str) -> Self {
        let mut slots = Vec::with_capacity(MAX_CONNECTED_PLAYERS);
        for _ in 0..MAX_CONNECTED_PLAYERS {
            slots.push(PlayerSlot::empty());
        }
        let mut registry = PlayerRegistry { slots };
        let host = registry
            .allocate(host_name)
            .expect("fresh registry must have a free slot");
        debug_assert_eq!(host, NET_HOST_SLOT);
        registry
    }

    pub fn host_slot(&self) -> u8 {
        NET_HOST_SLOT
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claims the lowest free slot. Returns `None` when every seat is taken.
    pub fn allocate(&mut self, name: &str) -> Option<u8> {
        let index = self.slots.iter().position(|s| !s.info.allocated)?;
        let slot = &mut self.slots[index];
        slot.info = PlayerInfo {
            allocated: true,
            name: clamp_name(name),
            heartbeat: true,
            kick: false,
            heart_attack_at: 0,
            colour: index as u8,
            position: index as u8,
            team: index as u8,
            ready: false,
        };
        slot.link = None;
        slot.last_traffic = Instant::now();
        Some(index as u8)
    }

    /// Deallocates a seat, discarding its connection. The seat stays in the
    /// array and can be reused by a later join.
    pub fn free(&mut self, slot: u8) {
        if let Some(s) = self.slots.get_mut(slot as usize) {
            s.info = PlayerInfo::default();
            s.link = None;
        }
    }

    pub fn attach_link(&mut self, slot: u8, link: NetLink) {
        if let Some(s) = self.slots.get_mut(slot as usize) {
            s.link = Some(link);
            s.last_traffic = Instant::now();
        }
    }

    pub fn get(&self, slot: u8) -> Option<&PlayerSlot> {
        self.slots.get(slot as usize)
    }

    pub fn get_mut(&mut self, slot: u8) -> Option<&mut PlayerSlot> {
        self.slots.get_mut(slot as usize)
    }

    pub fn is_allocated(&self, slot: u8) -> bool {
        self.slots
            .get(slot as usize)
            .map_or(false, |s| s.info.allocated)
    }

    /// Indices of all allocated seats, in slot order.
    pub fn allocated_slots(&self) -> Vec<u8> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.info.allocated)
            .map(|(i, _)| i as u8)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.info.allocated).count()
    }

    /// Snapshot of every seat's player fields, for the UI layer.
    pub fn roster(&self) -> Vec<PlayerInfo> {
        self.slots.iter().map(|s| s.info.clone()).collect()
    }
}

fn clamp_name(name: &str) -> String {
    let mut end = name.len().min(MAX_NAME_LEN);
    while end > 0 && !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}
