//! Ansible playbook and vars-file reader.

use serde_yaml::{Mapping, Value};
use terrane_model::ParseError;

use crate::values::{find_line, get, get_str, key_string};

/// Task keys that are not module invocations.
pub const TASK_KEYWORDS: &[&str] = &[
    "name",
    "when",
    "register",
    "notify",
    "listen",
    "tags",
    "become",
    "become_user",
    "become_method",
    "become_flags",
    "loop",
    "loop_control",
    "vars",
    "environment",
    "delegate_to",
    "delegate_facts",
    "run_once",
    "retries",
    "delay",
    "until",
    "no_log",
    "ignore_errors",
    "ignore_unreachable",
    "changed_when",
    "failed_when",
    "check_mode",
    "diff",
    "args",
    "async",
    "poll",
    "throttle",
    "timeout",
    "any_errors_fatal",
    "collections",
    "module_defaults",
    "connection",
    "debugger",
    "rescue",
    "always",
];

pub const PLAY_SECTIONS: &[&str] = &["pre_tasks", "tasks", "post_tasks", "handlers"];

fn is_keyword(key: &str) -> bool {
    TASK_KEYWORDS.contains(&key) || key.starts_with("with_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskSection {
    PreTasks,
    Tasks,
    PostTasks,
    Handlers,
}

impl TaskSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSection::PreTasks => "pre_tasks",
            TaskSection::Tasks => "tasks",
            TaskSection::PostTasks => "post_tasks",
            TaskSection::Handlers => "handlers",
        }
    }

    pub fn all() -> Vec<TaskSection> {
        vec![
            TaskSection::PreTasks,
            TaskSection::Tasks,
            TaskSection::PostTasks,
            TaskSection::Handlers,
        ]
    }

    pub fn from_key(key: &str) -> Option<TaskSection> {
        TaskSection::all().into_iter().find(|s| s.as_str() == key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: Option<String>,
    pub module: String,
    /// Structured module arguments, including `args:` when present
    pub args: Mapping,
    /// Free-form argument string, e.g. `shell: echo hi`
    pub free_form: Option<String>,
    /// Everything in `TASK_KEYWORDS` except `args`
    pub keywords: Mapping,
    pub line: Option<usize>,
}

impl Task {
    pub fn keyword(&self, key: &str) -> Option<&Value> {
        get(&self.keywords, key)
    }

    /// Handler names this task notifies.
    pub fn notifies(&self) -> Vec<String> {
        match self.keyword("notify") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Sequence(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Play {
    pub name: Option<String>,
    /// `hosts`, `become`, `vars`, `roles`, ...
    pub attributes: Mapping,
    pub sections: Vec<(TaskSection, Vec<Task>)>,
    pub line: Option<usize>,
}

impl Play {
    pub fn tasks(&self, section: TaskSection) -> &[Task] {
        self.sections
            .iter()
            .find(|(s, _)| *s == section)
            .map(|(_, tasks)| tasks.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybookEntry {
    Play(Play),
    /// `import_playbook` and friends, kept as YAML text
    Import { text: String, line: Option<usize> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnsibleFile {
    Playbook(Vec<PlaybookEntry>),
    /// `group_vars/` or `host_vars/` content
    Vars(Mapping),
}

pub fn is_vars_path(file: &str) -> bool {
    file.replace('\\', "/")
        .split('/')
        .any(|part| part == "group_vars" || part == "host_vars")
}

pub fn parse_ansible(file: &str, text: &str) -> (AnsibleFile, Vec<ParseError>) {
    let mut errors = Vec::new();

    let root: Value = match serde_yaml::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            let line = err.location().map(|l| l.line());
            errors.push(ParseError::new(file, line, format!("invalid YAML: {}", err)));
            let empty = if is_vars_path(file) {
                AnsibleFile::Vars(Mapping::new())
            } else {
                AnsibleFile::Playbook(Vec::new())
            };
            return (empty, errors);
        }
    };

    if is_vars_path(file) {
        return match root {
            Value::Mapping(map) => (AnsibleFile::Vars(map), errors),
            Value::Null => (AnsibleFile::Vars(Mapping::new()), errors),
            _ => {
                errors.push(ParseError::new(file, Some(1), "vars file must be a mapping"));
                (AnsibleFile::Vars(Mapping::new()), errors)
            }
        };
    }

    let items = match root {
        Value::Sequence(items) => items,
        Value::Null => Vec::new(),
        _ => {
            errors.push(ParseError::new(file, Some(1), "playbook must be a list of plays"));
            return (AnsibleFile::Playbook(Vec::new()), errors);
        }
    };

    let mut cursor = 1;
    let mut entries = Vec::new();
    for item in items {
        let map = match item {
            Value::Mapping(map) => map,
            _ => {
                errors.push(ParseError::new(file, Some(cursor), "play must be a mapping"));
                continue;
            }
        };
        let line = play_line(text, &map, cursor);
        if let Some(l) = line {
            cursor = l + 1;
        }

        if get(&map, "import_playbook").is_some() || get(&map, "include").is_some() {
            let text = serde_yaml::to_string(&vec![Value::Mapping(map)]).unwrap_or_default();
            entries.push(PlaybookEntry::Import { text, line });
            continue;
        }

        let mut play = Play {
            name: get_str(&map, "name").map(str::to_string),
            attributes: Mapping::new(),
            sections: Vec::new(),
            line,
        };
        for (key, value) in map {
            let key_name = key_string(&key);
            match TaskSection::from_key(&key_name) {
                Some(section) => {
                    let tasks = parse_task_list(file, text, &value, &mut cursor, &mut errors);
                    play.sections.push((section, tasks));
                }
                None => {
                    play.attributes.insert(key, value);
                }
            }
        }
        entries.push(PlaybookEntry::Play(play));
    }

    (AnsibleFile::Playbook(entries), errors)
}

fn play_line(text: &str, map: &Mapping, from: usize) -> Option<usize> {
    let needle = match (get_str(map, "name"), get_str(map, "import_playbook")) {
        (Some(name), _) => format!("name: {}", name),
        (None, Some(_)) => "import_playbook:".to_string(),
        _ => "hosts:".to_string(),
    };
    find_line(text, &needle, from)
}

fn parse_task_list(
    file: &str,
    text: &str,
    value: &Value,
    cursor: &mut usize,
    errors: &mut Vec<ParseError>,
) -> Vec<Task> {
    let items = match value {
        Value::Sequence(items) => items,
        Value::Null => return Vec::new(),
        _ => {
            errors.push(ParseError::new(file, Some(*cursor), "task list must be a sequence"));
            return Vec::new();
        }
    };

    let mut tasks = Vec::new();
    for item in items {
        let map = match item {
            Value::Mapping(map) => map,
            _ => {
                errors.push(ParseError::new(file, Some(*cursor), "task must be a mapping"));
                continue;
            }
        };
        let name = get_str(map, "name").map(str::to_string);
        let needle = match &name {
            Some(n) => format!("name: {}", n),
            None => map
                .keys()
                .next()
                .map(|k| format!("{}:", key_string(k)))
                .unwrap_or_default(),
        };
        let line = find_line(text, &needle, *cursor);
        if let Some(l) = line {
            *cursor = l + 1;
        }

        match parse_task(map, line) {
            Ok(task) => tasks.push(task),
            Err(message) => {
                let mut err = ParseError::new(file, line, message);
                if let Some(n) = &name {
                    err = err.with_resource(n.clone());
                }
                errors.push(err);
            }
        }
    }
    tasks
}

fn parse_task(map: &Mapping, line: Option<usize>) -> Result<Task, String> {
    let mut keywords = Mapping::new();
    let mut module_keys = Vec::new();
    let mut extra_args = Mapping::new();

    for (key, value) in map {
        let name = key_string(key);
        if name == "args" {
            if let Value::Mapping(args) = value {
                extra_args = args.clone();
            }
        } else if name == "block" {
            module_keys.push((name, value.clone()));
        } else if is_keyword(&name) {
            keywords.insert(key.clone(), value.clone());
        } else {
            module_keys.push((name, value.clone()));
        }
    }

    let (module, value) = match module_keys.len() {
        0 => return Err("task names no module".to_string()),
        1 => module_keys.remove(0),
        _ => {
            let names: Vec<String> = module_keys.into_iter().map(|(n, _)| n).collect();
            return Err(format!("task names more than one module: {}", names.join(", ")));
        }
    };

    let mut args = Mapping::new();
    let mut free_form = None;
    let kind = module.clone();
    let module = match kind.as_str() {
        "block" => {
            args.insert(Value::String("block".into()), value);
            for key in ["rescue", "always"] {
                if let Some(v) = keywords.remove(key) {
                    args.insert(Value::String(key.into()), v);
                }
            }
            module
        }
        "action" | "local_action" => {
            let spec = value.as_str().unwrap_or_default().trim().to_string();
            let (name, rest) = spec.split_once(char::is_whitespace).unwrap_or((spec.as_str(), ""));
            if name.is_empty() {
                return Err(format!("{} has no module name", module));
            }
            if module == "local_action" {
                keywords.insert(Value::String("delegate_to".into()), Value::String("localhost".into()));
            }
            if !rest.trim().is_empty() {
                free_form = Some(rest.trim().to_string());
            }
            name.to_string()
        }
        _ => {
            match value {
                Value::Mapping(m) => args = m,
                Value::Null => {}
                Value::String(s) => free_form = Some(s),
                other => free_form = Some(key_string(&other)),
            }
            module
        }
    };

    for (k, v) in extra_args {
        args.insert(k, v);
    }

    Ok(Task {
        name: get_str(map, "name").map(str::to_string),
        module,
        args,
        free_form,
        keywords,
        line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYBOOK: &str = "\
- name: Configure web
  hosts: web
  become: true
  tasks:
    - name: Install nginx
      apt:
        name: nginx
        state: present
      notify: restart nginx
    - name: Say hello
      shell: echo hello
      args:
        chdir: /tmp
  handlers:
    - name: restart nginx
      service:
        name: nginx
        state: restarted
- import_playbook: other.yml
";

    #[test]
    fn test_parse_playbook() {
        let (file, errors) = parse_ansible("site.yml", PLAYBOOK);
        assert!(errors.is_empty(), "{:?}", errors);
        let entries = match file {
            AnsibleFile::Playbook(entries) => entries,
            _ => panic!("expected playbook"),
        };
        assert_eq!(entries.len(), 2);
        let play = match &entries[0] {
            PlaybookEntry::Play(play) => play,
            _ => panic!("expected play"),
        };
        assert_eq!(play.name.as_deref(), Some("Configure web"));
        assert_eq!(play.line, Some(1));
        assert_eq!(get_str(&play.attributes, "hosts"), Some("web"));

        let tasks = play.tasks(TaskSection::Tasks);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].module, "apt");
        assert_eq!(tasks[0].notifies(), vec!["restart nginx"]);
        assert_eq!(tasks[0].line, Some(5));
        assert_eq!(tasks[1].free_form.as_deref(), Some("echo hello"));
        assert_eq!(get_str(&tasks[1].args, "chdir"), Some("/tmp"));

        let handlers = play.tasks(TaskSection::Handlers);
        assert_eq!(handlers[0].line, Some(15));
        assert!(matches!(entries[1], PlaybookEntry::Import { line: Some(19), .. }));
    }

    #[test]
    fn test_two_modules_is_an_error() {
        let text = "- hosts: all\n  tasks:\n    - name: confused\n      apt: name=x\n      yum: name=x\n    - name: fine\n      ping:\n";
        let (file, errors) = parse_ansible("site.yml", text);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].resource.as_deref(), Some("confused"));
        match file {
            AnsibleFile::Playbook(entries) => match &entries[0] {
                PlaybookEntry::Play(play) => assert_eq!(play.tasks(TaskSection::Tasks).len(), 1),
                _ => panic!("expected play"),
            },
            _ => panic!("expected playbook"),
        }
    }

    #[test]
    fn test_block_task() {
        let text = "- hosts: all\n  tasks:\n    - name: guarded\n      block:\n        - ping:\n      rescue:\n        - debug: msg=failed\n";
        let (file, errors) = parse_ansible("site.yml", text);
        assert!(errors.is_empty());
        if let AnsibleFile::Playbook(entries) = file {
            if let PlaybookEntry::Play(play) = &entries[0] {
                let task = &play.tasks(TaskSection::Tasks)[0];
                assert_eq!(task.module, "block");
                assert!(get(&task.args, "rescue").is_some());
                return;
            }
        }
        panic!("expected a play");
    }

    #[test]
    fn test_vars_file() {
        let (file, errors) = parse_ansible("group_vars/all.yml", "region: eu-west-1\n");
        assert!(errors.is_empty());
        assert!(matches!(file, AnsibleFile::Vars(ref m) if get_str(m, "region") == Some("eu-west-1")));
    }
}
