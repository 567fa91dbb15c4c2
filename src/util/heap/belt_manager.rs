use super::belt::Belt;
use crate::util::conversions::{bytes_to_formatted_string, raw_align_down, raw_is_aligned};
use crate::util::Address;
use std::fmt;

/// A heap configuration that cannot be used. These are fatal at startup.
#[derive(Debug)]
pub enum ConfigurationError {
    /// The heap size is not a multiple of the TLAB granularity.
    HeapSizeNotAligned { heap_size: usize, granularity: usize },
    /// The belt percentages do not add up to 100.
    PercentagesDoNotSum { sum: usize },
    /// A belt was given a share of 0%.
    ZeroPercentage { index: usize },
    /// The heap scheme expects a different number of belts.
    WrongBeltCount { expected: usize, found: usize },
    /// A belt would be smaller than one TLAB.
    BeltTooSmall { index: usize, size: usize, granularity: usize },
    /// The oldest belt cannot hold half of the belt before it, so even an empty heap
    /// would be out of memory after its first promotion.
    OldestBeltTooSmall { size: usize, previous_size: usize },
    /// The heap could not be reserved.
    ReservationFailed(std::io::Error),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigurationError::HeapSizeNotAligned {
                heap_size,
                granularity,
            } => write!(
                f,
                "heap size {} is not a multiple of the TLAB size {}",
                heap_size, granularity
            ),
            ConfigurationError::PercentagesDoNotSum { sum } => {
                write!(f, "belt percentages add up to {}%, not 100%", sum)
            }
            ConfigurationError::ZeroPercentage { index } => {
                write!(f, "belt {} is given 0% of the heap", index)
            }
            ConfigurationError::WrongBeltCount { expected, found } => {
                write!(f, "expected {} belts, found {}", expected, found)
            }
            ConfigurationError::BeltTooSmall {
                index,
                size,
                granularity,
            } => write!(
                f,
                "belt {} would be {} bytes, smaller than the TLAB size {}",
                index, size, granularity
            ),
            ConfigurationError::OldestBeltTooSmall {
                size,
                previous_size,
            } => write!(
                f,
                "the oldest belt would be {} bytes, less than half of the {} bytes before it",
                size, previous_size
            ),
            ConfigurationError::ReservationFailed(e) => {
                write!(f, "failed to reserve the heap: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigurationError::ReservationFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// The names of belts, youngest first. Belts beyond these are named "belt".
const BELT_NAMES: [&str; 3] = ["eden", "to-space", "mature"];

/// Partitions one contiguous heap range into ordered belts, youngest first.
/// The belts always tile the heap: each belt ends where the next one starts.
pub struct BeltManager {
    start: Address,
    end: Address,
    granularity: usize,
    belts: Vec<Belt>,
}

impl BeltManager {
    /// Split `[start, start + total_size)` into belts sized by `percentages`. Every
    /// boundary is aligned to `granularity`, and the last belt takes the rounding.
    pub fn initialize(
        start: Address,
        total_size: usize,
        percentages: &[usize],
        granularity: usize,
    ) -> Result<Self, ConfigurationError> {
        if percentages.is_empty() {
            return Err(ConfigurationError::WrongBeltCount {
                expected: 1,
                found: 0,
            });
        }
        if !raw_is_aligned(total_size, granularity) {
            return Err(ConfigurationError::HeapSizeNotAligned {
                heap_size: total_size,
                granularity,
            });
        }
        let sum: usize = percentages.iter().sum();
        if sum != 100 {
            return Err(ConfigurationError::PercentagesDoNotSum { sum });
        }
        if let Some(index) = percentages.iter().position(|p| *p == 0) {
            return Err(ConfigurationError::ZeroPercentage { index });
        }

        let end = start + total_size;
        let mut belts = Vec::with_capacity(percentages.len());
        let mut cursor = start;
        for (index, percentage) in percentages.iter().enumerate() {
            let size = if index == percentages.len() - 1 {
                end - cursor
            } else {
                let share = (total_size as u128 * *percentage as u128 / 100) as usize;
                raw_align_down(share, granularity)
            };
            if size < granularity {
                return Err(ConfigurationError::BeltTooSmall {
                    index,
                    size,
                    granularity,
                });
            }
            let name = BELT_NAMES.get(index).copied().unwrap_or("belt");
            belts.push(Belt::new(name, index, cursor, cursor + size));
            cursor += size;
        }
        debug_assert_eq!(cursor, end);

        let manager = BeltManager {
            start,
            end,
            granularity,
            belts,
        };
        debug!("Initialized belts:\n{}", manager.describe());
        Ok(manager)
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.end
    }

    pub fn granularity(&self) -> usize {
        self.granularity
    }

    pub fn num_belts(&self) -> usize {
        self.belts.len()
    }

    /// The i-th belt in allocation order, 0 being the youngest.
    pub fn belt(&self, index: usize) -> &Belt {
        &self.belts[index]
    }

    pub fn belts(&self) -> &[Belt] {
        &self.belts
    }

    pub fn youngest(&self) -> &Belt {
        &self.belts[0]
    }

    pub fn oldest(&self) -> &Belt {
        &self.belts[self.belts.len() - 1]
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.start <= addr && addr < self.end
    }

    /// The belt containing the address, if any.
    pub fn belt_containing(&self, addr: Address) -> Option<&Belt> {
        self.belts.iter().find(|b| b.contains(addr))
    }

    /// Move the boundary between belt `index` and belt `index + 1` to `new_boundary`.
    /// This only changes bounds, it never moves objects: the boundary cannot cross
    /// the allocated part of either belt. Returns false if the move is rejected.
    pub fn resize_boundary(&self, index: usize, new_boundary: Address) -> bool {
        if index + 1 >= self.belts.len() {
            return false;
        }
        let lower = &self.belts[index];
        let upper = &self.belts[index + 1];
        if !new_boundary.is_aligned_to(self.granularity)
            || new_boundary < lower.allocation_mark().align_up(self.granularity)
            || new_boundary < lower.start() + self.granularity
            || new_boundary > upper.end() - self.granularity
            // The upper belt must be empty to move its start.
            || upper.used() != 0
        {
            debug!(
                "Rejected moving the boundary between {} and {} to {}",
                lower.name(),
                upper.name(),
                new_boundary
            );
            return false;
        }
        lower.set_bounds(lower.start(), new_boundary);
        upper.set_bounds(new_boundary, upper.end());
        upper.set_allocation_mark(new_boundary);
        debug_assert!(self.verify_partition());
        true
    }

    /// Do the belts tile the heap in order, each with its mark inside its bounds?
    pub fn verify_partition(&self) -> bool {
        let mut cursor = self.start;
        for belt in &self.belts {
            if belt.start() != cursor
                || belt.allocation_mark() < belt.start()
                || belt.allocation_mark() > belt.end()
            {
                return false;
            }
            cursor = belt.end();
        }
        cursor == self.end
    }

    /// The regions published to an inspector: one per belt.
    pub fn memory_regions(&self) -> Vec<(Address, usize)> {
        self.belts.iter().map(|b| (b.start(), b.size())).collect()
    }

    pub fn describe(&self) -> String {
        let lines: Vec<String> = self.belts.iter().map(|b| format!("  {}", b)).collect();
        format!(
            "heap [{}, {}) {}\n{}",
            self.start,
            self.end,
            bytes_to_formatted_string(self.end - self.start),
            lines.join("\n")
        )
    }
}
