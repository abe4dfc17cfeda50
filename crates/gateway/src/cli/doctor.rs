use relay_domain::config::{Config, ConfigSeverity};

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("relay-gateway doctor");
    println!("====================\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_redis(config, &mut all_passed).await;
    check_database(config, &mut all_passed).await;
    check_storage_dir("avatars", &config.storage.avatars_dir, &mut all_passed);
    check_storage_dir("temp attachments", &config.storage.temp_attachments_dir, &mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults + env)")
        },
    );
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({error_count} error(s))", issues.len()),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

async fn check_redis(config: &Config, all_passed: &mut bool) {
    let reachable = relay_cache::Kv::connect(&config.cache.redis_url).await.is_ok();
    print_check(
        "Redis reachable",
        reachable,
        if reachable {
            "connected".into()
        } else {
            format!("{} (unreachable)", config.cache.redis_url)
        },
    );
    if !reachable {
        *all_passed = false;
    }
}

async fn check_database(config: &Config, all_passed: &mut bool) {
    let reachable = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.database.database_url)
        .await
        .is_ok();
    print_check(
        "Database reachable",
        reachable,
        if reachable {
            "connected".into()
        } else {
            format!("{} (unreachable)", config.database.database_url)
        },
    );
    if !reachable {
        *all_passed = false;
    }
}

fn check_storage_dir(label: &str, dir: &str, all_passed: &mut bool) {
    let path = std::path::Path::new(dir);
    let exists = path.exists();
    let writable = if exists {
        let probe = path.join(".relay_gateway_doctor_probe");
        let w = std::fs::write(&probe, b"probe").is_ok();
        let _ = std::fs::remove_file(&probe);
        w
    } else {
        false
    };

    let ok = exists && writable;
    let detail = match (exists, writable) {
        (true, true) => format!("{dir} (writable)"),
        (true, false) => format!("{dir} (not writable)"),
        _ => format!("{dir} (does not exist)"),
    };

    print_check(&format!("Storage directory ({label})"), ok, detail);
    if !ok {
        *all_passed = false;
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
