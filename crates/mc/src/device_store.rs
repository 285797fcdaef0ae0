//! In-memory device memory, modelled on the reference device manager: a
//! table of valid address ranges per series, bit/word/dword/string access,
//! and the bit-as-word duality used by batch random access commands.

use std::collections::HashMap;
use std::sync::Mutex;

use mc_proto::{DeviceKind, DeviceType};

/// A device's valid address range on a given PLC series.
#[derive(Debug, Clone, Copy)]
pub struct DeviceRange {
    pub min_address: u32,
    pub max_address: u32,
}

impl DeviceRange {
    const fn new(min_address: u32, max_address: u32) -> Self {
        DeviceRange { min_address, max_address }
    }

    fn contains(self, address: u32) -> bool {
        (self.min_address..=self.max_address).contains(&address)
    }
}

/// Which PLC series' address ranges to emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    Q,
    IqR,
}

fn range_for(series: Series, device: DeviceType) -> DeviceRange {
    use DeviceType::*;
    match series {
        Series::Q => match device {
            D => DeviceRange::new(0, 12287),
            M => DeviceRange::new(0, 8191),
            Y => DeviceRange::new(0, 0x1FFF),
            X => DeviceRange::new(0, 0x1FFF),
            B => DeviceRange::new(0, 0x7FFF),
            W => DeviceRange::new(0, 0x7FFF),
            L => DeviceRange::new(0, 8191),
            F => DeviceRange::new(0, 2047),
            V => DeviceRange::new(0, 2047),
            S => DeviceRange::new(0, 8191),
            R => DeviceRange::new(0, 32767),
            ZR => DeviceRange::new(0, 0xFFFFF),
            TN => DeviceRange::new(0, 2047),
            TC => DeviceRange::new(0, 2047),
            TS => DeviceRange::new(0, 2047),
            CN => DeviceRange::new(0, 1023),
            CC => DeviceRange::new(0, 1023),
            CS => DeviceRange::new(0, 1023),
            SM => DeviceRange::new(0, 2047),
            SD => DeviceRange::new(0, 2047),
            SB => DeviceRange::new(0, 0x7FF),
            SW => DeviceRange::new(0, 0x7FF),
            Z => DeviceRange::new(0, 19),
        },
        Series::IqR => match device {
            D => DeviceRange::new(0, 65535),
            M => DeviceRange::new(0, 65535),
            Y => DeviceRange::new(0, 0x1FFF),
            X => DeviceRange::new(0, 0x1FFF),
            B => DeviceRange::new(0, 0x7FFF),
            W => DeviceRange::new(0, 0xFFFF),
            L => DeviceRange::new(0, 32767),
            F => DeviceRange::new(0, 32767),
            V => DeviceRange::new(0, 32767),
            S => DeviceRange::new(0, 8191),
            R => DeviceRange::new(0, 32767),
            ZR => DeviceRange::new(0, 0xFFFFFFF),
            TN => DeviceRange::new(0, 2047),
            TC => DeviceRange::new(0, 2047),
            TS => DeviceRange::new(0, 2047),
            CN => DeviceRange::new(0, 1023),
            CC => DeviceRange::new(0, 1023),
            CS => DeviceRange::new(0, 1023),
            SM => DeviceRange::new(0, 4095),
            SD => DeviceRange::new(0, 4095),
            SB => DeviceRange::new(0, 0x7FF),
            SW => DeviceRange::new(0, 0x7FF),
            Z => DeviceRange::new(0, 19),
        },
    }
}

/// Reason an access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    OutOfRange,
}

/// Thread-safe device memory for one emulated PLC.
///
/// Word devices store raw 16-bit cells; bit devices store one cell per bit
/// (0 or 1), matching the reference manager's per-address dictionary model
/// rather than packing 16 bits per word internally.
pub struct DeviceStore {
    series: Series,
    memory: Mutex<HashMap<DeviceType, HashMap<u32, u16>>>,
}

impl DeviceStore {
    pub fn new(series: Series) -> Self {
        let mut memory = HashMap::new();
        for device in DeviceType::ALL {
            memory.insert(device, HashMap::new());
        }
        DeviceStore {
            series,
            memory: Mutex::new(memory),
        }
    }

    fn range(&self, device: DeviceType) -> DeviceRange {
        range_for(self.series, device)
    }

    pub fn validate_address(&self, device: DeviceType, address: u32) -> bool {
        self.range(device).contains(address)
    }

    pub fn validate_range(&self, device: DeviceType, start: u32, count: u32) -> bool {
        count > 0
            && self.validate_address(device, start)
            && start
                .checked_add(count - 1)
                .is_some_and(|end| self.validate_address(device, end))
    }

    pub fn get_bit(&self, device: DeviceType, address: u32) -> bool {
        let memory = self.memory.lock().unwrap();
        memory
            .get(&device)
            .and_then(|m| m.get(&address))
            .map(|v| *v != 0)
            .unwrap_or(false)
    }

    pub fn set_bit(&self, device: DeviceType, address: u32, value: bool) -> Result<(), StoreError> {
        if !self.validate_address(device, address) {
            return Err(StoreError::OutOfRange);
        }
        let mut memory = self.memory.lock().unwrap();
        memory.entry(device).or_default().insert(address, value as u16);
        Ok(())
    }

    pub fn get_bits(&self, device: DeviceType, start: u32, count: u32) -> Vec<bool> {
        (0..count).map(|i| self.get_bit(device, start + i)).collect()
    }

    pub fn set_bits(&self, device: DeviceType, start: u32, values: &[bool]) -> Result<(), StoreError> {
        if !self.validate_range(device, start, values.len() as u32) {
            return Err(StoreError::OutOfRange);
        }
        for (i, value) in values.iter().enumerate() {
            self.set_bit(device, start + i as u32, *value)?;
        }
        Ok(())
    }

    pub fn get_word(&self, device: DeviceType, address: u32) -> u16 {
        let memory = self.memory.lock().unwrap();
        memory.get(&device).and_then(|m| m.get(&address)).copied().unwrap_or(0)
    }

    pub fn set_word(&self, device: DeviceType, address: u32, value: u16) -> Result<(), StoreError> {
        if !self.validate_address(device, address) {
            return Err(StoreError::OutOfRange);
        }
        let mut memory = self.memory.lock().unwrap();
        memory.entry(device).or_default().insert(address, value);
        Ok(())
    }

    pub fn get_words(&self, device: DeviceType, start: u32, count: u32) -> Vec<u16> {
        (0..count).map(|i| self.get_word(device, start + i)).collect()
    }

    pub fn set_words(&self, device: DeviceType, start: u32, values: &[u16]) -> Result<(), StoreError> {
        if !self.validate_range(device, start, values.len() as u32) {
            return Err(StoreError::OutOfRange);
        }
        for (i, value) in values.iter().enumerate() {
            self.set_word(device, start + i as u32, *value)?;
        }
        Ok(())
    }

    pub fn get_dword(&self, device: DeviceType, address: u32) -> u32 {
        let low = self.get_word(device, address) as u32;
        let high = self.get_word(device, address + 1) as u32;
        (high << 16) | low
    }

    pub fn set_dword(&self, device: DeviceType, address: u32, value: u32) -> Result<(), StoreError> {
        self.set_word(device, address, (value & 0xFFFF) as u16)?;
        self.set_word(device, address + 1, (value >> 16) as u16)
    }

    /// Read 16 consecutive bits of a bit device packed into a word, LSB first.
    pub fn get_bit_as_word(&self, device: DeviceType, start: u32) -> u16 {
        let mut result = 0u16;
        for i in 0..16 {
            if self.get_bit(device, start + i) {
                result |= 1 << i;
            }
        }
        result
    }

    /// Write a word's 16 bits out to 16 consecutive bit-device addresses.
    pub fn set_bit_from_word(&self, device: DeviceType, start: u32, value: u16) -> Result<(), StoreError> {
        for i in 0..16 {
            self.set_bit(device, start + i, value & (1 << i) != 0)?;
        }
        Ok(())
    }

    /// Read a word-packed ASCII string: two characters per word, low byte
    /// first, trailing NUL characters stripped.
    pub fn get_string(&self, device: DeviceType, start: u32, length: u32) -> String {
        let word_count = length.div_ceil(2);
        let mut bytes = Vec::with_capacity(word_count as usize * 2);
        for word in self.get_words(device, start, word_count) {
            bytes.push((word & 0xFF) as u8);
            bytes.push((word >> 8) as u8);
        }
        bytes.truncate(length as usize);
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Write `text` left-justified and NUL-padded to `length` characters,
    /// packed two characters per word, low byte first.
    pub fn set_string(&self, device: DeviceType, start: u32, text: &str, length: u32) -> Result<(), StoreError> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(length as usize, 0);
        let words: Vec<u16> = bytes
            .chunks(2)
            .map(|pair| {
                let low = pair[0] as u16;
                let high = pair.get(1).copied().unwrap_or(0) as u16;
                low | (high << 8)
            })
            .collect();
        self.set_words(device, start, &words)
    }

    pub fn kind_of(&self, device: DeviceType) -> DeviceKind {
        device.kind()
    }

    pub fn clear_device(&self, device: DeviceType) {
        self.memory.lock().unwrap().entry(device).or_default().clear();
    }

    pub fn clear_all(&self) {
        let mut memory = self.memory.lock().unwrap();
        for table in memory.values_mut() {
            table.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_read_write_round_trips() {
        let store = DeviceStore::new(Series::Q);
        store.set_word(DeviceType::D, 10, 1234).unwrap();
        assert_eq!(store.get_word(DeviceType::D, 10), 1234);
    }

    #[test]
    fn out_of_range_write_is_rejected() {
        let store = DeviceStore::new(Series::Q);
        assert_eq!(
            store.set_word(DeviceType::D, 99999, 1),
            Err(StoreError::OutOfRange)
        );
    }

    #[test]
    fn iqr_widens_d_register_range() {
        let store = DeviceStore::new(Series::IqR);
        assert!(store.validate_address(DeviceType::D, 20000));
        let q_store = DeviceStore::new(Series::Q);
        assert!(!q_store.validate_address(DeviceType::D, 20000));
    }

    #[test]
    fn bit_as_word_round_trips() {
        let store = DeviceStore::new(Series::Q);
        store.set_bit_from_word(DeviceType::M, 0, 0b1010).unwrap();
        assert!(store.get_bit(DeviceType::M, 1));
        assert!(store.get_bit(DeviceType::M, 3));
        assert!(!store.get_bit(DeviceType::M, 0));
        assert_eq!(store.get_bit_as_word(DeviceType::M, 0), 0b1010);
    }

    #[test]
    fn devices_are_isolated_from_each_other() {
        let store = DeviceStore::new(Series::Q);
        store.set_word(DeviceType::D, 0, 5).unwrap();
        assert_eq!(store.get_word(DeviceType::W, 0), 0);
    }

    #[test]
    fn dword_spans_two_words() {
        let store = DeviceStore::new(Series::Q);
        store.set_dword(DeviceType::D, 0, 0x0001_0002).unwrap();
        assert_eq!(store.get_word(DeviceType::D, 0), 0x0002);
        assert_eq!(store.get_word(DeviceType::D, 1), 0x0001);
        assert_eq!(store.get_dword(DeviceType::D, 0), 0x0001_0002);
    }

    #[test]
    fn string_round_trips_through_word_packed_ascii() {
        let store = DeviceStore::new(Series::Q);
        store.set_string(DeviceType::D, 0, "HELLO", 10).unwrap();
        assert_eq!(store.get_word(DeviceType::D, 0), 0x4548); // 'H' | 'E' << 8
        assert_eq!(store.get_string(DeviceType::D, 0, 10), "HELLO");
    }

    #[test]
    fn string_read_strips_trailing_padding() {
        let store = DeviceStore::new(Series::Q);
        store.set_string(DeviceType::D, 0, "HI", 8).unwrap();
        assert_eq!(store.get_string(DeviceType::D, 0, 8), "HI");
    }
}
