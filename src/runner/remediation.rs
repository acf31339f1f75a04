//! Known failure signatures in the bot process output and the fix to suggest
//! for each. Matching is ordered and checks one line at a time.

/// Context substituted into suggestions that reference the server settings.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub port: String,
    pub minecraft_version: String,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            port: "25565".into(),
            minecraft_version: "the correct version".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ConnectionRefused,
    ModuleNotFound,
    ConnectionReset,
    NativeLoadFailed,
    NullVersion,
    MissingApiKey,
}

/// Checked in order; the first substring hit wins.
const TRIGGERS: &[(&str, Trigger)] = &[
    ("ECONNREFUSED", Trigger::ConnectionRefused),
    ("ERR_MODULE_NOT_FOUND", Trigger::ModuleNotFound),
    ("ECONNRESET", Trigger::ConnectionReset),
    ("ERR_DLOPEN_FAILED", Trigger::NativeLoadFailed),
    (
        "Cannot read properties of null (reading 'version')",
        Trigger::NullVersion,
    ),
    ("not found in keys.json", Trigger::MissingApiKey),
];

impl Trigger {
    pub fn suggestion(&self, ctx: &RunContext) -> String {
        match self {
            Trigger::ConnectionRefused => format!(
                "Ensure your game is Open to LAN on port {}, and you're playing {}. \
                 If you're using a different version, change it in Settings.",
                ctx.port, ctx.minecraft_version
            ),
            Trigger::ModuleNotFound => {
                "A required file is missing. Try reinstalling the app.".into()
            }
            Trigger::ConnectionReset => format!(
                "Make sure that you're playing Minecraft {}. \
                 If you're using a different version, change it in Settings.",
                ctx.minecraft_version
            ),
            Trigger::NativeLoadFailed => {
                "A critical component failed to load. Please try reinstalling the app.".into()
            }
            Trigger::NullVersion => {
                "Try again with a vanilla client - mindcraft-ce doesn't support mods!".into()
            }
            Trigger::MissingApiKey => {
                "Make sure you've filled in your API keys in the API Keys section.".into()
            }
        }
    }
}

/// Suggestion shown when the user asks for help without a recognized error.
pub fn fallback_suggestion() -> &'static str {
    "Not sure. Try asking on Discord, or filing a GitHub issue."
}

pub fn detect(line: &str) -> Option<Trigger> {
    TRIGGERS
        .iter()
        .find(|(needle, _)| line.contains(needle))
        .map(|(_, trigger)| *trigger)
}

/// Maps one output line to a remediation hint, if it matches a known trigger.
pub fn suggested_fix(line: &str, ctx: &RunContext) -> Option<String> {
    detect(line).map(|trigger| trigger.suggestion(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_trigger_maps_to_its_suggestion() {
        let ctx = RunContext::default();
        for (needle, trigger) in TRIGGERS {
            let line = format!("some log prefix {needle} some suffix");
            assert_eq!(suggested_fix(&line, &ctx), Some(trigger.suggestion(&ctx)));
        }
    }

    #[test]
    fn unrecognized_lines_yield_nothing() {
        let ctx = RunContext::default();
        assert_eq!(suggested_fix("agent spawned at (12, 64, -3)", &ctx), None);
        assert_eq!(suggested_fix("", &ctx), None);
    }

    #[test]
    fn connection_refused_references_the_configured_port() {
        let ctx = RunContext {
            port: "25565".into(),
            minecraft_version: "1.21.1".into(),
        };
        let fix =
            suggested_fix("Error: connect ECONNREFUSED 127.0.0.1:25565", &ctx).unwrap();
        assert!(fix.contains("Open to LAN on port 25565"));
        assert!(fix.contains("1.21.1"));
    }

    #[test]
    fn exact_suggestion_strings() {
        let ctx = RunContext::default();
        assert_eq!(
            suggested_fix("ERR_MODULE_NOT_FOUND", &ctx).unwrap(),
            "A required file is missing. Try reinstalling the app."
        );
        assert_eq!(
            suggested_fix("ERR_DLOPEN_FAILED", &ctx).unwrap(),
            "A critical component failed to load. Please try reinstalling the app."
        );
        assert_eq!(
            suggested_fix("TypeError: Cannot read properties of null (reading 'version')", &ctx)
                .unwrap(),
            "Try again with a vanilla client - mindcraft-ce doesn't support mods!"
        );
        assert_eq!(
            suggested_fix("key OPENAI_API_KEY not found in keys.json", &ctx).unwrap(),
            "Make sure you've filled in your API keys in the API Keys section."
        );
    }

    #[test]
    fn first_match_wins_on_ambiguous_lines() {
        // A line containing two signatures reports the earlier table entry.
        let ctx = RunContext::default();
        let fix = suggested_fix("ECONNREFUSED after ECONNRESET", &ctx).unwrap();
        assert!(fix.contains("Open to LAN"));
    }
}
