/// A simple flat register file starting at address 0
#[derive(Debug)]
pub struct LinearMemory {
    pub data: Vec<u8>,
}

impl LinearMemory {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn read_u8(&self, addr: u16) -> Option<u8> {
        self.data.get(addr as usize).copied()
    }

    pub fn write_u8(&mut self, addr: u16, value: u8) -> bool {
        match self.data.get_mut(addr as usize) {
            Some(byte) => {
                *byte = value;
                true
            }
            None => false,
        }
    }
}
