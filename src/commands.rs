//! Parsing of the interactive prompt's command lines.

use lazy_static::lazy_static;
use regex::Regex;

use crate::catalog::{AccessLevel, DataMode};
use crate::pager::Direction;

lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(r#""((?:[^"\\]|\\.)*)"|(\S+)"#).unwrap();
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Help,
    Quit,
    Open { project: String, version: Option<String> },
    List(Option<DataMode>),
    Select { mode: DataMode, name: Option<String> },
    Params,
    Set { name: String, values: Vec<String> },
    Apply,
    Page(Direction),
    PageSize(String),
    Sql(String),
    Show,
    Copy,
    Export(String),
    Lineage(String),
    Compiled(String),
    Login { username: String, password: String },
    Logout,
    WhoAmI,
    Providers,
    ApiKeys,
    CreateApiKey { title: String, expiry_days: Option<u64> },
    DeleteApiKey(String),
    ChangePassword { current: String, new_password: String, confirm: String },
    Users,
    UserFields,
    AddUser {
        username: String,
        password: String,
        access_level: AccessLevel,
        fields: Vec<(String, String)>,
    },
    DeleteUser(String),
}

/// Split a line into words; double quotes group words and `\"` escapes a quote
pub fn tokenize(line: &str) -> Vec<String> {
    TOKEN_REGEX
        .captures_iter(line)
        .map(|caps| match caps.get(1) {
            Some(quoted) => quoted.as_str().replace("\\\"", "\"").replace("\\\\", "\\"),
            None => caps[2].to_string(),
        })
        .collect()
}

fn parse_mode(word: &str) -> Result<DataMode, String> {
    word.parse()
}

fn parse_access_level(word: &str) -> Result<AccessLevel, String> {
    match word.to_lowercase().as_str() {
        "admin" => Ok(AccessLevel::Admin),
        "member" => Ok(AccessLevel::Member),
        "guest" => Ok(AccessLevel::Guest),
        other => Err(format!("unknown access level '{}'", other)),
    }
}

fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    line.get(..keyword.len())
        .filter(|head| head.eq_ignore_ascii_case(keyword))
        .map(|_| &line[keyword.len()..])
}

/// Parse one prompt line
///
/// # Returns
/// * `Ok(None)` for a blank line
/// * `Err(status)` with a short message for anything malformed
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    // SQL keeps its own quoting and spacing
    if let Some(rest) = strip_keyword(line, "sql ") {
        return Ok(Some(Command::Sql(rest.trim().to_string())));
    }

    let tokens = tokenize(line);
    let args: Vec<&str> = tokens.iter().skip(1).map(String::as_str).collect();
    let head = tokens[0].to_lowercase();

    let command = match (head.as_str(), args.as_slice()) {
        ("help" | "?", _) => Command::Help,
        ("q" | "quit" | "exit", _) => Command::Quit,
        ("open", [project]) => Command::Open {
            project: project.to_string(),
            version: None,
        },
        ("open", [project, version]) => Command::Open {
            project: project.to_string(),
            version: Some(version.to_string()),
        },
        ("list" | "ls", []) => Command::List(None),
        ("list" | "ls", [mode]) => Command::List(Some(parse_mode(mode)?)),
        ("select" | "use", [mode]) => Command::Select {
            mode: parse_mode(mode)?,
            name: None,
        },
        ("select" | "use", [mode, name]) => Command::Select {
            mode: parse_mode(mode)?,
            name: Some(name.to_string()),
        },
        ("params", []) => Command::Params,
        ("set", [name, values @ ..]) => Command::Set {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        },
        ("apply", []) => Command::Apply,
        ("page", [direction]) => Command::Page(direction.parse()?),
        ("first" | "prev" | "next" | "last", []) => Command::Page(head.parse()?),
        ("pagesize", [size]) => Command::PageSize(size.to_string()),
        ("show", []) => Command::Show,
        ("copy", []) => Command::Copy,
        ("export", [path]) => Command::Export(path.to_string()),
        ("lineage", [name]) => Command::Lineage(name.to_string()),
        ("compiled", [model]) => Command::Compiled(model.to_string()),
        ("login", [username, password]) => Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        },
        ("logout", []) => Command::Logout,
        ("whoami", []) => Command::WhoAmI,
        ("providers", []) => Command::Providers,
        ("apikeys", []) => Command::ApiKeys,
        ("apikey", ["create", title]) => Command::CreateApiKey {
            title: title.to_string(),
            expiry_days: None,
        },
        ("apikey", ["create", title, days]) => Command::CreateApiKey {
            title: title.to_string(),
            expiry_days: Some(days.parse().map_err(|_| format!("invalid expiry '{}'", days))?),
        },
        ("apikey", ["delete", id]) => Command::DeleteApiKey(id.to_string()),
        ("password", [current, new_password, confirm]) => Command::ChangePassword {
            current: current.to_string(),
            new_password: new_password.to_string(),
            confirm: confirm.to_string(),
        },
        ("users", []) => Command::Users,
        ("userfields", []) => Command::UserFields,
        ("user", ["add", username, password, level, fields @ ..]) => Command::AddUser {
            username: username.to_string(),
            password: password.to_string(),
            access_level: parse_access_level(level)?,
            fields: fields
                .iter()
                .map(|f| {
                    f.split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .ok_or_else(|| format!("expected field=value, got '{}'", f))
                })
                .collect::<Result<_, _>>()?,
        },
        ("user", ["delete", username]) => Command::DeleteUser(username.to_string()),
        _ => return Err("invalid command".to_string()),
    };
    Ok(Some(command))
}

pub const HELP: &str = "\
Commands:
  open <project> [version]      Open a project
  list [mode]                   List datasets, dashboards, models, or lineage
  select <mode> [name]          Explore a data object
  params                        Show the parameter form
  set <param> [values...]       Change a parameter selection
  apply                         Fetch results with the current selections
  first | prev | next | last    Move between result pages
  pagesize <n>                  Rows per page for the next apply
  sql <query>                   Run SQL against the models (model mode)
  show                          Show the current result
  copy                          Print the current page as tab-separated text
  export <file>                 Save the current result
  lineage <name>                Show upstream and downstream of an object
  compiled <model>              Show a model's compiled definition
  login <user> <password>       Log in
  logout                        Log out
  whoami                        Show the current user
  providers                     List external login providers
  apikeys                       List your API keys
  apikey create <title> [days]  Create an API key
  apikey delete <id>            Revoke an API key
  password <old> <new> <new>    Change your password
  users | userfields            List users or custom user fields (admin)
  user add <name> <password> <level> [field=value...]
  user delete <name>
  q                             Quit";
