//! Collectable contracts and the configuration-driven `basic` entry type.

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::collectable::key::NamespacedKey;
use crate::collectable::notice::DiscoveryContext;

/// A single trackable entry within a repository.
pub trait Collectable: Send + Sync + 'static {
    fn display_name(&self) -> &str;

    /// Plain-text name without formatting, if the entry defines one separately.
    fn plain_display_name(&self) -> Option<&str> {
        None
    }

    /// Icon shown when unlocked. Rendering is up to the menu layer.
    fn icon(&self) -> Option<&ItemConfig> {
        None
    }

    /// Icon shown while locked, if it differs from [`Collectable::icon`].
    fn locked_icon(&self) -> Option<&ItemConfig> {
        None
    }

    /// Whether menus list this entry before it is unlocked.
    fn show_when_locked(&self) -> bool;

    /// Whether unlocking again after the first time counts as a replay.
    fn allow_replay(&self) -> bool;

    /// Active unlock/replay behaviour, for entries that have any.
    fn as_discoverable(&self) -> Option<&dyn Discoverable> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Hooks invoked by the orchestrator after a successful unlock or replay.
pub trait Discoverable: Send + Sync {
    /// Called once per Locked -> Unlocked transition.
    fn on_discover(&self, ctx: &DiscoveryContext<'_>);

    /// Called for each permitted replay of an already unlocked entry.
    fn on_replay(&self, ctx: &DiscoveryContext<'_>);
}

/// Where a collectable lives. Resolved back to its repository through the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectableMeta {
    pub namespace: String,
    pub entry_id: String,
}

impl CollectableMeta {
    pub fn key(&self) -> Result<NamespacedKey, crate::collectable::CodexError> {
        NamespacedKey::new(&self.namespace, &self.entry_id)
    }
}

/// Icon description handed through to the menu layer untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemConfig {
    pub material: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lore: Vec<String>,
    pub glint: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_model_data: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandTarget {
    #[default]
    Console,
    Player,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub command: String,
    #[serde(default)]
    pub run_as: CommandTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub commands: Vec<CommandInfo>,
}

impl CommandConfig {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuClick {
    Left,
    Right,
    Shift,
}

fn default_true() -> bool {
    true
}

/// The built-in `basic` type. Every optional behaviour falls back along a fixed
/// chain when it is not configured:
///
/// - replay messages and commands fall back to their discover counterparts
/// - right and shift click commands fall back to left click
/// - the locked icon falls back to the unlocked icon (see [`Collectable::locked_icon`])
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicCollectable {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plain_display_name: Option<String>,
    pub show_when_locked: bool,
    pub allow_replay: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<ItemConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_icon: Option<ItemConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_message_on_discover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_message_on_replay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_message_on_discover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_message_on_replay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands_on_discover: Option<CommandConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands_on_replay: Option<CommandConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands_on_menu_left_click: Option<CommandConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands_on_menu_right_click: Option<CommandConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands_on_menu_shift_click: Option<CommandConfig>,
}

impl Default for BasicCollectable {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            plain_display_name: None,
            show_when_locked: true,
            allow_replay: false,
            icon: None,
            locked_icon: None,
            global_message_on_discover: None,
            global_message_on_replay: None,
            player_message_on_discover: None,
            player_message_on_replay: None,
            commands_on_discover: None,
            commands_on_replay: None,
            commands_on_menu_left_click: None,
            commands_on_menu_right_click: None,
            commands_on_menu_shift_click: None,
        }
    }
}

impl BasicCollectable {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_replay(mut self, allow: bool) -> Self {
        self.allow_replay = allow;
        self
    }

    pub fn hidden_when_locked(mut self) -> Self {
        self.show_when_locked = false;
        self
    }

    pub fn with_player_message(mut self, text: &str) -> Self {
        self.player_message_on_discover = Some(text.to_string());
        self
    }

    pub fn with_global_message(mut self, text: &str) -> Self {
        self.global_message_on_discover = Some(text.to_string());
        self
    }

    pub fn global_message_on_discover(&self) -> Option<&str> {
        self.global_message_on_discover.as_deref()
    }

    pub fn global_message_on_replay(&self) -> Option<&str> {
        self.global_message_on_replay
            .as_deref()
            .or_else(|| self.global_message_on_discover())
    }

    pub fn player_message_on_discover(&self) -> Option<&str> {
        self.player_message_on_discover.as_deref()
    }

    pub fn player_message_on_replay(&self) -> Option<&str> {
        self.player_message_on_replay
            .as_deref()
            .or_else(|| self.player_message_on_discover())
    }

    pub fn commands_on_discover(&self) -> Option<&CommandConfig> {
        self.commands_on_discover.as_ref()
    }

    pub fn commands_on_replay(&self) -> Option<&CommandConfig> {
        self.commands_on_replay
            .as_ref()
            .or_else(|| self.commands_on_discover())
    }

    pub fn menu_commands(&self, click: MenuClick) -> Option<&CommandConfig> {
        let left = self.commands_on_menu_left_click.as_ref();
        match click {
            MenuClick::Left => left,
            MenuClick::Right => self.commands_on_menu_right_click.as_ref().or(left),
            MenuClick::Shift => self.commands_on_menu_shift_click.as_ref().or(left),
        }
    }

    fn emit(
        ctx: &DiscoveryContext<'_>,
        global: Option<&str>,
        private: Option<&str>,
        commands: Option<&CommandConfig>,
    ) {
        if let Some(text) = global {
            ctx.broadcast(text);
        }
        if let Some(text) = private {
            ctx.tell(text);
        }
        if let Some(config) = commands.filter(|c| c.enabled) {
            for info in &config.commands {
                ctx.run_command(info);
            }
        }
    }
}

impl Collectable for BasicCollectable {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn plain_display_name(&self) -> Option<&str> {
        self.plain_display_name.as_deref()
    }

    fn icon(&self) -> Option<&ItemConfig> {
        self.icon.as_ref()
    }

    fn locked_icon(&self) -> Option<&ItemConfig> {
        self.locked_icon.as_ref()
    }

    fn show_when_locked(&self) -> bool {
        self.show_when_locked
    }

    fn allow_replay(&self) -> bool {
        self.allow_replay
    }

    fn as_discoverable(&self) -> Option<&dyn Discoverable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Discoverable for BasicCollectable {
    fn on_discover(&self, ctx: &DiscoveryContext<'_>) {
        Self::emit(
            ctx,
            self.global_message_on_discover(),
            self.player_message_on_discover(),
            self.commands_on_discover(),
        );
    }

    fn on_replay(&self, ctx: &DiscoveryContext<'_>) {
        Self::emit(
            ctx,
            self.global_message_on_replay(),
            self.player_message_on_replay(),
            self.commands_on_replay(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectable::notice::{Notice, NoticeOutbox, PlayerRef};
    use uuid::Uuid;

    fn command(text: &str) -> CommandConfig {
        CommandConfig {
            enabled: true,
            commands: vec![CommandInfo {
                command: text.to_string(),
                run_as: CommandTarget::Player,
            }],
        }
    }

    #[test]
    fn replay_settings_fall_back_to_discover() {
        let mut entry = BasicCollectable::new("Old Map").with_player_message("You found a map");
        entry.commands_on_discover = Some(command("map open"));
        assert_eq!(entry.player_message_on_replay(), Some("You found a map"));
        assert_eq!(entry.commands_on_replay(), Some(&command("map open")));
        assert_eq!(entry.global_message_on_replay(), None);

        entry.player_message_on_replay = Some("The map again".into());
        assert_eq!(entry.player_message_on_replay(), Some("The map again"));
    }

    #[test]
    fn menu_clicks_fall_back_to_left() {
        let mut entry = BasicCollectable::new("Shell");
        assert!(entry.menu_commands(MenuClick::Shift).is_none());
        entry.commands_on_menu_left_click = Some(command("left"));
        entry.commands_on_menu_right_click = Some(command("right"));
        assert_eq!(entry.menu_commands(MenuClick::Right), Some(&command("right")));
        assert_eq!(entry.menu_commands(MenuClick::Shift), Some(&command("left")));
    }

    #[test]
    fn decodes_from_json_with_defaults() {
        let raw = serde_json::json!({
            "type": "basic",
            "display_name": "<gold>Page One",
            "allow_replay": true,
            "commands_on_discover": { "commands": [{ "command": "say hi" }] }
        });
        let entry: BasicCollectable = serde_json::from_value(raw).unwrap();
        assert!(entry.show_when_locked);
        assert!(entry.allow_replay);
        let cmds = entry.commands_on_discover().unwrap();
        assert!(cmds.enabled);
        assert_eq!(cmds.commands[0].run_as, CommandTarget::Console);
    }

    #[test]
    fn discover_emits_configured_notices() {
        let mut entry = BasicCollectable::new("Page")
            .with_global_message("someone found a page")
            .with_player_message("you found a page");
        entry.commands_on_discover = Some(CommandConfig {
            enabled: false,
            commands: vec![CommandInfo {
                command: "never".into(),
                run_as: CommandTarget::Console,
            }],
        });
        let (outbox, mut rx) = NoticeOutbox::channel();
        let player = PlayerRef::new(Uuid::new_v4(), "Alex");
        let key = NamespacedKey::new("notes", "page").unwrap();
        entry.on_discover(&DiscoveryContext::new(&player, &key, &outbox));

        assert!(matches!(rx.try_recv().unwrap(), Notice::Broadcast { .. }));
        assert!(matches!(rx.try_recv().unwrap(), Notice::PlayerMessage { .. }));
        assert!(rx.try_recv().is_err(), "disabled commands must not run");
    }
}
