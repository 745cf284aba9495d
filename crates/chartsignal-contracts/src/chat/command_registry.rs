#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "choose_file",
    },
    CommandSpec {
        command: "pick",
        action: "choose_file",
    },
];

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "drop",
    action: "drop",
}];

pub(crate) const MODAL_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "open",
        action: "open_modal",
    },
    CommandSpec {
        command: "close",
        action: "close_modal",
    },
    CommandSpec {
        command: "outside",
        action: "click_outside_modal",
    },
];

pub(crate) const CREDENTIAL_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "signin",
        action: "sign_in",
    },
    CommandSpec {
        command: "login",
        action: "sign_in",
    },
    CommandSpec {
        command: "signup",
        action: "sign_up",
    },
];

pub(crate) const CLICK_COMMAND: CommandSpec = CommandSpec {
    command: "click",
    action: "click",
};

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "dragover",
        action: "drag_over",
    },
    CommandSpec {
        command: "dragleave",
        action: "drag_leave",
    },
    CommandSpec {
        command: "retry",
        action: "retry",
    },
    CommandSpec {
        command: "detail",
        action: "detailed_report",
    },
    CommandSpec {
        command: "close_report",
        action: "close_report",
    },
    CommandSpec {
        command: "logout",
        action: "logout",
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

pub const PAGE_HELP_COMMANDS: &[&str] = &[
    "/upload <path>",
    "/drop <path>...",
    "/dragover",
    "/dragleave",
    "/click [area|choose|retry]",
    "/retry",
    "/detail",
    "/close_report",
    "/open <signin|signup>",
    "/close <signin|signup>",
    "/outside <signin|signup>",
    "/signin <email> <password>",
    "/signup <email> <password>",
    "/logout",
    "/status",
    "/help",
    "/quit",
];
