#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is a single free-text value.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mode",
        action: "set_mode",
    },
    CommandSpec {
        command: "prompt",
        action: "set_prompt",
    },
    CommandSpec {
        command: "lora_folder",
        action: "set_lora_folder",
    },
    CommandSpec {
        command: "scan_loras",
        action: "scan_loras",
    },
    CommandSpec {
        command: "send_result",
        action: "send_result",
    },
    CommandSpec {
        command: "send_answer",
        action: "send_answer",
    },
    CommandSpec {
        command: "send_thinking",
        action: "send_thinking",
    },
    CommandSpec {
        command: "delete",
        action: "delete_history",
    },
];

/// Numeric generation parameters, all routed to `set_param`.
pub(crate) const PARAM_COMMANDS: &[&str] = &[
    "width",
    "height",
    "steps",
    "guidance",
    "seed",
    "randomize",
    "strength",
    "mix",
    "top_k",
    "temperature",
];

/// Commands taking shell-split positional arguments.
pub(crate) const ARG_LIST_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "remove_image",
        action: "remove_image",
    },
    CommandSpec {
        command: "ratio",
        action: "set_ratio",
    },
    CommandSpec {
        command: "lora",
        action: "set_lora",
    },
    CommandSpec {
        command: "remove_lora",
        action: "remove_lora",
    },
    CommandSpec {
        command: "page",
        action: "change_page",
    },
    CommandSpec {
        command: "icons",
        action: "set_icon_size",
    },
    CommandSpec {
        command: "restore",
        action: "restore_history",
    },
    CommandSpec {
        command: "load",
        action: "load_to_slot",
    },
    CommandSpec {
        command: "load_all",
        action: "load_sources",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "go",
        action: "generate",
    },
    CommandSpec {
        command: "swap",
        action: "swap_images",
    },
    CommandSpec {
        command: "original_ratio",
        action: "set_original_ratio",
    },
    CommandSpec {
        command: "add_lora",
        action: "add_lora",
    },
    CommandSpec {
        command: "history",
        action: "history",
    },
    CommandSpec {
        command: "show_all",
        action: "toggle_show_all",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "stop",
        action: "stop",
    },
    CommandSpec {
        command: "exit_server",
        action: "shutdown",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/mode",
    "/prompt",
    "/generate",
    "/stop",
    "/upload",
    "/remove_image",
    "/swap",
    "/width",
    "/height",
    "/steps",
    "/guidance",
    "/seed",
    "/randomize",
    "/strength",
    "/mix",
    "/top_k",
    "/temperature",
    "/ratio",
    "/original_ratio",
    "/lora_folder",
    "/scan_loras",
    "/add_lora",
    "/lora",
    "/remove_lora",
    "/history",
    "/page",
    "/icons",
    "/show_all",
    "/restore",
    "/load",
    "/load_all",
    "/delete",
    "/send_result",
    "/send_answer",
    "/send_thinking",
    "/status",
    "/exit_server",
    "/quit",
];
