use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;
use tokencraft_core::{Database, CURRENT_SCHEMA_VERSION};

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("tokencraft/profiles.db")
    }

    fn write_config(&self, content: &str) {
        let dir = self.xdg_config.join("tokencraft");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), content).expect("failed to write config");
    }
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("tokencraft"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute tokencraft: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "tokencraft {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_bin(env, args);
    assert_success(args, &output);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn run_json(env: &CliTestEnv, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["--format", "json"];
    full.extend_from_slice(args);
    let stdout = run_ok(env, &full);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("invalid JSON from tokencraft: {e}\n{stdout}"))
}

#[test]
fn evaluate_creates_profile_and_snapshot() {
    let env = CliTestEnv::new();
    let sessions = fixture("sessions.json");

    let stdout = run_ok(&env, &["evaluate", "--identity", "dev", "--sessions", &sessions]);
    assert!(stdout.contains("Session score"));
    assert!(stdout.contains("token_efficiency"));
    assert!(stdout.contains("Final:"));

    let db_path = env.db_path();
    assert!(
        db_path.exists(),
        "database file should exist at {}",
        db_path.display()
    );

    let db = Database::open(&db_path).expect("failed to open db");
    db.migrate().expect("failed to migrate db");
    let profile = db
        .load_profile("dev")
        .expect("failed to load profile")
        .expect("profile should exist");
    assert_eq!(profile.schema_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(profile.total_sessions, 1);
    assert_eq!(db.count_snapshots("dev").expect("failed to count"), 1);
}

#[test]
fn evaluate_json_reports_invariant() {
    let env = CliTestEnv::new();
    let sessions = fixture("sessions.json");

    let eval = run_json(&env, &["evaluate", "-i", "dev", "-s", &sessions]);
    let report = &eval["report"];
    let raw = report["raw_total"].as_f64().unwrap();
    let multiplier = report["streak_multiplier"].as_f64().unwrap();
    let bonuses = &report["bonuses"];
    let bonus_total: f64 = ["streak", "combo", "achievement", "recency"]
        .iter()
        .map(|k| bonuses[*k].as_f64().unwrap())
        .sum();
    let final_total = report["final_total"].as_f64().unwrap();

    assert!((final_total - (raw * multiplier + bonus_total).min(2875.0)).abs() < 1e-6);
    assert_eq!(report["categories"].as_array().unwrap().len(), 10);
    assert_eq!(eval["profile"]["identity"], "dev");
}

#[test]
fn dry_run_saves_nothing() {
    let env = CliTestEnv::new();
    let sessions = fixture("sessions.json");

    let stdout = run_ok(
        &env,
        &["evaluate", "-i", "dev", "-s", &sessions, "--dry-run"],
    );
    assert!(stdout.contains("dry run"));

    let output = run_bin(&env, &["profile", "-i", "dev"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no profile found"), "stderr:\n{stderr}");
}

#[test]
fn repeated_evaluations_build_history() {
    let env = CliTestEnv::new();
    let sessions = fixture("sessions.json");
    let next = fixture("session-next.json");

    run_ok(&env, &["evaluate", "-i", "dev", "-s", &sessions]);
    run_ok(&env, &["evaluate", "-i", "dev", "-s", &next]);

    let profile = run_json(&env, &["profile", "-i", "dev"]);
    assert_eq!(profile["profile"]["total_sessions"], 2);
    assert_eq!(profile["needs_migration"], false);

    let snapshots = run_json(&env, &["snapshots", "-i", "dev"]);
    assert_eq!(snapshots["snapshots"].as_array().unwrap().len(), 2);
    assert!(snapshots["latest_change"].is_object());

    let text = run_ok(&env, &["snapshots", "-i", "dev"]);
    assert!(text.contains("Latest change:"));

    let pruned = run_json(&env, &["snapshots", "-i", "dev", "--prune", "1"]);
    assert_eq!(pruned["pruned"], 1);
    assert_eq!(pruned["snapshots"].as_array().unwrap().len(), 1);
}

#[test]
fn migrate_upgrades_stored_v2_profile() {
    let env = CliTestEnv::new();
    let payload = fs::read_to_string(
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../tokencraft-core/tests/fixtures/v2-captain.json"),
    )
    .expect("failed to read v2 fixture");

    {
        let db = Database::open(&env.db_path()).expect("failed to open db");
        db.migrate().expect("failed to migrate db");
        db.connection()
            .execute(
                "INSERT INTO profiles VALUES ('veteran', 2, 1000.0, ?1, '2026-02-21T10:00:00Z')",
                [&payload],
            )
            .expect("failed to seed profile");
    }

    let preview = run_json(&env, &["migrate", "-i", "veteran", "--dry-run"]);
    assert_eq!(preview["from_version"], 2);
    let still_v2 = run_json(&env, &["profile", "-i", "veteran"]);
    assert_eq!(still_v2["needs_migration"], true);

    let text = run_ok(&env, &["migrate", "-i", "veteran"]);
    assert!(text.contains("from rubric v2 to v3"));
    assert!(text.contains("dropped   night_owl"));

    let profile = run_json(&env, &["profile", "-i", "veteran"]);
    assert_eq!(profile["profile"]["schema_version"], 3);
    assert_eq!(profile["profile"]["current_rank"], "commodore");

    let again = run_ok(&env, &["migrate", "-i", "veteran"]);
    assert!(again.contains("already at rubric v3"));
}

#[test]
fn achievements_and_ranks_listings() {
    let env = CliTestEnv::new();

    let ranks = run_ok(&env, &["ranks"]);
    assert!(ranks.contains("Cadet"));
    assert!(ranks.contains("Galactic Legend"));

    let table = run_json(&env, &["ranks"]);
    assert_eq!(table.as_array().unwrap().len(), 10);

    let empty = run_json(&env, &["achievements", "-i", "nobody"]);
    assert_eq!(empty["stats"]["unlocked"], 0);
    assert_eq!(empty["stats"]["total"], 26);

    run_ok(&env, &["evaluate", "-i", "dev", "-s", &fixture("sessions.json")]);
    let unlocked = run_json(&env, &["achievements", "-i", "dev"]);
    assert!(unlocked["stats"]["unlocked"].as_u64().unwrap() >= 1);
}

#[test]
fn invalid_config_is_rejected() {
    let env = CliTestEnv::new();
    env.write_config("[engine]\nhistory_capacity = 0\n");

    let output = run_bin(&env, &["ranks"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load configuration"), "stderr:\n{stderr}");
}
