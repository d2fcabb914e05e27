#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const MODE_COMMAND: CommandSpec = CommandSpec {
    command: "mode",
    action: "set_mode",
};

pub(crate) const GENERATE_COMMAND: CommandSpec = CommandSpec {
    command: "generate",
    action: "generate",
};

pub(crate) const ROTATION_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "rotate",
        action: "rotate_upload",
    },
    CommandSpec {
        command: "rotate_result",
        action: "rotate_result",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "save",
    action: "save",
}];

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "upload",
    action: "upload",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/mode",
    "/upload",
    "/rotate",
    "/rotate_result",
    "/generate",
    "/save",
    "/reset",
    "/status",
    "/help",
    "/quit",
];
