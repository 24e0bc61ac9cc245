//! Flat value banks backing uniform storage: growable arrays of 4-component
//! registers with explicit length/capacity tracking. Register offsets handed
//! out by `alloc` stay valid across growth, so the growth policy (geometric,
//! at least +8 registers) is part of the contract.

#[derive(Clone, Debug, Default)]
pub(crate) struct RegisterBank<T> {
    components: Vec<T>,
    len: u32,
    cap: u32,
}

impl<T: Copy + Default> RegisterBank<T> {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            len: 0,
            cap: 0,
        }
    }

    /// Current size in registers.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Capacity in registers.
    pub fn capacity(&self) -> u32 {
        self.cap
    }

    /// Claim `count` registers and return the start register. Existing
    /// register contents keep their offsets and bit patterns across growth;
    /// the claimed range starts zeroed.
    pub fn alloc(&mut self, count: u32) -> u32 {
        let start = self.len;

        if self.len + count > self.cap {
            let new_cap = (self.len + count).max(self.len + 8);
            self.components.resize((new_cap * 4) as usize, T::default());
            self.cap = new_cap;
        }

        for v in &mut self.components[(start * 4) as usize..((start + count) * 4) as usize] {
            *v = T::default();
        }

        self.len += count;
        start
    }

    /// Components of `count` registers starting at `start`.
    pub fn registers(&self, start: u32, count: u32) -> &[T] {
        &self.components[(start * 4) as usize..((start + count) * 4) as usize]
    }

    pub fn registers_mut(&mut self, start: u32, count: u32) -> &mut [T] {
        &mut self.components[(start * 4) as usize..((start + count) * 4) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_hands_out_sequential_start_registers() {
        let mut bank = RegisterBank::<f32>::new();
        assert_eq!(bank.alloc(1), 0);
        assert_eq!(bank.alloc(4), 1);
        assert_eq!(bank.alloc(2), 5);
        assert_eq!(bank.len(), 7);
    }

    #[test]
    fn growth_reserves_at_least_eight_registers_past_the_old_size() {
        let mut bank = RegisterBank::<i32>::new();
        bank.alloc(1);
        assert!(bank.capacity() >= 8);

        // fill to capacity, then overflow with a small claim
        let remaining = bank.capacity() - bank.len();
        bank.alloc(remaining);
        let len_before = bank.len();
        bank.alloc(1);
        assert!(bank.capacity() >= len_before + 8);
        assert!(bank.capacity() >= bank.len());
    }

    #[test]
    fn growth_preserves_existing_register_contents() {
        let mut bank = RegisterBank::<f32>::new();
        let first = bank.alloc(2);
        bank.registers_mut(first, 2)
            .copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        // grow well past the initial capacity
        for _ in 0..16 {
            bank.alloc(4);
        }

        assert_eq!(
            bank.registers(first, 2),
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn claimed_registers_start_zeroed() {
        let mut bank = RegisterBank::<i32>::new();
        let start = bank.alloc(3);
        assert!(bank.registers(start, 3).iter().all(|&v| v == 0));
    }
}
