use std::fs;
use std::process::Command;

use tempfile::tempdir;

const COHORT: &str = "sample_id\tdiagnosis\tabeta\ttau\n\
s1\t0\t0.0\t1.0\n\
s2\t0\t0.2\t1.2\n\
s3\t0\t-0.1\t0.9\n\
s4\t1\t4.0\tNA\n\
s5\t1\t4.3\t5.2\n\
s6\t1\t3.8\t4.9\n\
s7\t2\t2.0\t3.0\n";

#[test]
fn prob_mat_cli_writes_long_table() {
    let tmp = tempdir().expect("temporary directory");
    let cohort_path = tmp.path().join("cohort.tsv");
    let config_path = tmp.path().join("run.toml");
    let out_path = tmp.path().join("probs.tsv");
    fs::write(&cohort_path, COHORT).expect("write cohort");
    fs::write(&config_path, "alphas = [0.3, 0.5]\nmax_iterations = 50\n").expect("write config");

    let exe = env!("CARGO_BIN_EXE_ebmix");
    let status = Command::new(exe)
        .args([
            "prob-mat",
            cohort_path.to_str().expect("path str"),
            "--out",
            out_path.to_str().expect("path str"),
            "--config",
            config_path.to_str().expect("path str"),
        ])
        .status()
        .expect("run ebmix cli");
    assert!(status.success(), "CLI exited with status {status:?}");

    let text = fs::read_to_string(&out_path).expect("read output");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "sample_id\tbiomarker\tp_normal\tp_abnormal");
    assert_eq!(lines.len(), 1 + 7 * 2);
    assert!(lines.contains(&"s4\ttau\t0.5\t0.5"));
    for line in &lines[1..] {
        let fields: Vec<&str> = line.split('\t').collect();
        let p_normal: f64 = fields[2].parse().expect("numeric p_normal");
        let p_abnormal: f64 = fields[3].parse().expect("numeric p_abnormal");
        assert_eq!(p_normal + p_abnormal, 1.0);
    }
}

#[test]
fn prob_mat_cli_reports_bad_config() {
    let tmp = tempdir().expect("temporary directory");
    let cohort_path = tmp.path().join("cohort.tsv");
    let config_path = tmp.path().join("run.toml");
    fs::write(&cohort_path, COHORT).expect("write cohort");
    fs::write(&config_path, "alphas = [0.3, 0.5, 0.7]\n").expect("write config");

    let exe = env!("CARGO_BIN_EXE_ebmix");
    let output = Command::new(exe)
        .args([
            "prob-mat",
            cohort_path.to_str().expect("path str"),
            "--out",
            tmp.path().join("probs.tsv").to_str().expect("path str"),
            "--config",
            config_path.to_str().expect("path str"),
            "--family",
            "kde",
        ])
        .output()
        .expect("run ebmix cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("alphas"), "unexpected stderr: {stderr}");
}
