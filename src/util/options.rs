use crate::util::constants::*;
use std::fmt;
use std::str::FromStr;

/// The default heap size.
pub const DEFAULT_HEAP_SIZE: usize = 64 << LOG_BYTES_IN_MBYTE;
/// The default TLAB size.
pub const DEFAULT_TLAB_SIZE: usize = 16 << LOG_BYTES_IN_KBYTE;

/// How the heap is split into belts, as percentages of the heap from the youngest belt
/// to the oldest belt. The generational scheme uses three belts: eden, to-space and mature.
///
/// The string format is a comma separated list, e.g. `"10,40,50"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeltPercentages(Vec<usize>);

impl BeltPercentages {
    pub fn new(percentages: Vec<usize>) -> Self {
        BeltPercentages(percentages)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for BeltPercentages {
    fn default() -> Self {
        BeltPercentages(vec![10, 40, 50])
    }
}

impl FromStr for BeltPercentages {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .map_err(|e| format!("Failed to parse belt percentage {:?}: {}", p, e))
            })
            .collect::<Result<Vec<usize>, String>>()
            .map(BeltPercentages)
    }
}

impl fmt::Display for BeltPercentages {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($(#[$outer:meta])*$name:ident: $type:ty [$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])*$name: $type [$validator] = $default),*);
    ];
    ($($(#[$outer:meta])*$name:ident: $type:ty [$validator:expr] = $default:expr),*) => [
        /// Beltway options. Each option can be set from the environment with the
        /// `BELTWAY_` prefix (e.g. `BELTWAY_HEAP_SIZE=33554432`), or programmatically
        /// through [`Options::set_from_str`] and [`Options::set_bulk_from_command_line`].
        #[derive(Clone, Debug)]
        pub struct Options {
            $($(#[$outer])*pub $name: $type),*
        }
        impl Options {
            /// Set an option from its name and a string value. Returns false if the
            /// value cannot be parsed or fails validation, in which case the option is unchanged.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling process()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            warn!("unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("unknown option {}", s);
                        false
                    }
                }
            }

            /// Set options from a whitespace separated list of `key=value` pairs.
            /// Returns false if any pair is malformed or rejected.
            pub fn set_bulk_from_command_line(&mut self, options: &str) -> bool {
                let mut all_ok = true;
                for opt in options.split_ascii_whitespace() {
                    match opt.split_once('=') {
                        Some((key, val)) => all_ok &= self.set_from_str(key, val),
                        None => {
                            warn!("malformed option {:?}, expected key=value", opt);
                            all_ok = false;
                        }
                    }
                }
                all_ok
            }

            /// Options with their default values, ignoring the environment.
            pub fn defaults() -> Self {
                Options {
                    $($name: $default),*
                }
            }

            /// Read options from environment variables that start with `BELTWAY_`.
            pub fn read_env_var_settings(&mut self) {
                const PREFIX: &str = "BELTWAY_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { self.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
            }
        }
        impl Default for Options {
            /// Default values, overridden by any `BELTWAY_` environment variables.
            fn default() -> Self {
                let mut options = Self::defaults();
                options.read_env_var_settings();
                options
            }
        }
    ]
}

options! {
    /// The total size of the heap in bytes. Must be a multiple of `tlab_size`.
    heap_size:            usize           [|v: &usize| *v > 0] = DEFAULT_HEAP_SIZE,
    /// Belt sizes as percentages of the heap, youngest first.
    belt_percentages:     BeltPercentages [|v: &BeltPercentages| !v.is_empty()] = BeltPercentages::default(),
    /// The size of a thread-local allocation buffer.
    tlab_size:            usize           [|v: &usize| *v >= MIN_TLAB_SIZE && v.is_power_of_two()] = DEFAULT_TLAB_SIZE,
    /// Allocate through TLABs. If false, every allocation bumps the youngest belt directly.
    use_tlabs:            bool            [always_valid] = true,
    /// Mark cards in the write barrier. The collector scans whole belts regardless.
    card_marking_barrier: bool            [always_valid] = false,
    /// The number of root slots available to an inspector.
    max_inspector_roots:  usize           [|v: &usize| *v > 0] = DEFAULT_MAX_INSPECTOR_ROOTS,
    /// Log belt occupancy and statistics at every collection.
    verbose:              bool            [always_valid] = false,
}
