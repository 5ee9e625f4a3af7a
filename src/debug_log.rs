use std::env;
use std::fmt;
use std::str::FromStr;

/// Emits a message on one of the inference spew channels
///
/// Each channel is a separate `tracing` target, so channels can be enabled independently with a
/// filter such as `typeflow::ops=trace`.
#[macro_export]
macro_rules! infer_spew {
    (dynamic, $($arg:tt)*) => {
        ::tracing::debug!(target: "typeflow::dynamic", $($arg)*)
    };
    (ops, $($arg:tt)*) => {
        ::tracing::trace!(target: "typeflow::ops", $($arg)*)
    };
    (result, $($arg:tt)*) => {
        ::tracing::info!(target: "typeflow::result", $($arg)*)
    };
}

/// The environment variable read by `SpewChannels::from_env`
pub const SPEW_ENV_VAR: &str = "TYPEFLOW_SPEW";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpewChannel {
    /// Dynamic type changes and inference entry points
    Dynamic,
    /// New constraints and types
    Ops,
    /// Final type sets
    Result,
}

impl SpewChannel {
    pub const ALL: [SpewChannel; 3] = [SpewChannel::Dynamic, SpewChannel::Ops, SpewChannel::Result];

    pub fn name(self) -> &'static str {
        match self {
            SpewChannel::Dynamic => "dynamic",
            SpewChannel::Ops => "ops",
            SpewChannel::Result => "result",
        }
    }

    /// The `tracing` target that messages on this channel are emitted with
    pub fn target(self) -> &'static str {
        match self {
            SpewChannel::Dynamic => "typeflow::dynamic",
            SpewChannel::Ops => "typeflow::ops",
            SpewChannel::Result => "typeflow::result",
        }
    }

    /// The most verbose level used on this channel
    fn level(self) -> &'static str {
        match self {
            SpewChannel::Dynamic => "debug",
            SpewChannel::Ops => "trace",
            SpewChannel::Result => "info",
        }
    }
}

/// The set of enabled spew channels
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpewChannels {
    enabled: [bool; 3],
}

impl SpewChannels {
    pub fn all() -> Self {
        Self {enabled: [true; 3]}
    }

    /// Reads the channels from `TYPEFLOW_SPEW`. Unset or invalid values enable nothing.
    pub fn from_env() -> Self {
        env::var(SPEW_ENV_VAR).ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    pub fn enable(&mut self, channel: SpewChannel) {
        self.enabled[channel as usize] = true;
    }

    pub fn is_enabled(&self, channel: SpewChannel) -> bool {
        self.enabled[channel as usize]
    }

    pub fn is_empty(&self) -> bool {
        !self.enabled.iter().any(|&enabled| enabled)
    }

    /// A `tracing_subscriber::EnvFilter` directive that enables exactly these channels
    pub fn filter_directive(&self) -> String {
        let directives: Vec<_> = SpewChannel::ALL.iter()
            .filter(|&&channel| self.is_enabled(channel))
            .map(|channel| format!("{}={}", channel.target(), channel.level()))
            .collect();

        if directives.is_empty() {
            "off".to_string()
        } else {
            directives.join(",")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSpewChannel(String);

impl fmt::Display for UnknownSpewChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown spew channel `{}` (valid values: dynamic, ops, result, full)", self.0)
    }
}

/// Parses a comma separated list of channel names. `full` enables every channel.
impl FromStr for SpewChannels {
    type Err = UnknownSpewChannel;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let mut channels = SpewChannels::default();

        for name in src.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            match name {
                "full" => channels = SpewChannels::all(),
                _ => {
                    let channel = SpewChannel::ALL.iter()
                        .find(|channel| channel.name().eq_ignore_ascii_case(name))
                        .ok_or_else(|| UnknownSpewChannel(name.to_string()))?;
                    channels.enable(*channel);
                },
            }
        }

        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_channel_list() {
        let channels: SpewChannels = "ops, result".parse().unwrap();
        assert!(!channels.is_enabled(SpewChannel::Dynamic));
        assert!(channels.is_enabled(SpewChannel::Ops));
        assert!(channels.is_enabled(SpewChannel::Result));
        assert_eq!(channels.filter_directive(), "typeflow::ops=trace,typeflow::result=info");
    }

    #[test]
    fn full_enables_everything() {
        let channels: SpewChannels = "full".parse().unwrap();
        assert_eq!(channels, SpewChannels::all());
    }

    #[test]
    fn empty_list_disables_everything() {
        let channels: SpewChannels = "".parse().unwrap();
        assert!(channels.is_empty());
        assert_eq!(channels.filter_directive(), "off");
    }

    #[test]
    fn unknown_channel_is_an_error() {
        let err = "ops,bogus".parse::<SpewChannels>().unwrap_err();
        assert_eq!(err, UnknownSpewChannel("bogus".to_string()));
    }
}
