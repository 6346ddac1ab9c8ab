// tests/job_model.rs

use std::error::Error;
use std::path::PathBuf;

use condor_launcher::credentials::lease_uses;
use condor_launcher::credentials::vault::has_mount;
use condor_launcher::model::messages::{stop_queue_name, stop_request_key};
use condor_launcher::model::{JobDescription, JobRequest, JobState, StepInput, UpdateMessage};
use condor_launcher_test_utils::builders::{ConfigFileBuilder, JobBuilder};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn launch_request_tolerates_nulls_and_keeps_unknown_fields() -> TestResult {
    let body = json!({
        "command": "LAUNCH",
        "job": {
            "uuid": "inv-1",
            "username": "ipcdev@iplantcollaborative.org",
            "name": "Word Count",
            "group": null,
            "user_groups": null,
            "app_id": "c7f05682-23c8-4182-b9a2-e09650a5f49b",
            "steps": [{
                "type": "condor",
                "component": {
                    "name": "wc_wrapper.sh",
                    "location": "/usr/local3/bin/wc_tool-1.00",
                    "container": {
                        "image": { "name": " discoenv/wc ", "tag": "latest\n" },
                        "memory_limit": null,
                        "min_disk_space": 1048576
                    }
                },
                "config": {
                    "inputs": [{ "value": "/iplant/home/in", "multiplicity": "collection", "id": "in-1" }],
                    "params": null
                }
            }]
        }
    });

    let request: JobRequest = serde_json::from_value(body)?;

    assert!(request.is_launch());
    let job = &request.job;
    assert_eq!(job.invocation_id, "inv-1");
    assert!(job.group.is_empty());
    assert!(job.user_groups.is_empty());
    assert_eq!(job.extra["app_id"], "c7f05682-23c8-4182-b9a2-e09650a5f49b");
    assert_eq!(job.steps[0].extra["type"], "condor");
    assert_eq!(job.steps[0].component.container.memory_limit, 0);
    assert_eq!(job.steps[0].config.inputs[0].extra["id"], "in-1");

    let round_trip = serde_json::to_value(job)?;
    assert_eq!(round_trip["app_id"], "c7f05682-23c8-4182-b9a2-e09650a5f49b");
    assert_eq!(round_trip["uuid"], "inv-1");
    assert_eq!(round_trip["username"], "ipcdev@iplantcollaborative.org");
    Ok(())
}

#[test]
fn launcher_defaults_fill_only_unset_fields() {
    let cfg = ConfigFileBuilder::new("/condor/logs").build();

    let job = JobBuilder::new("inv-1")
        .submitter("ipcdev@iplantcollaborative.org")
        .build_with_defaults(&cfg);

    assert_eq!(job.request_disk, "0");
    assert_eq!(job.condor_log_path, "/condor/logs");
    assert_eq!(job.irods_base, "/iplant/home");
    assert_eq!(job.filter_files, vec!["foo", "bar"]);
    assert_eq!(job.submitter, "ipcdev_iplantcollaborative.org");
    assert_eq!(job.now_date, "2016-01-01-12-00-00.000");

    let job = JobBuilder::new("inv-2")
        .request_disk("123")
        .build_with_defaults(&cfg);
    assert_eq!(job.request_disk, "123");
}

#[test]
fn step_disk_minimums_do_not_set_the_disk_request() {
    let cfg = ConfigFileBuilder::new("/condor/logs")
        .with_request_disk("1GB")
        .build();

    let mut job = JobBuilder::new("inv-1").extra_step().build();
    job.steps[0].component.container.min_disk_space = 1024;
    job.steps[1].component.container.min_disk_space = 1025;
    job.apply_launcher_defaults(&cfg);
    assert_eq!(job.disk_request(), 1025);
    assert_eq!(job.request_disk, "1GB");

    let cfg = ConfigFileBuilder::new("/condor/logs")
        .with_request_disk("")
        .build();
    let job = JobBuilder::new("inv-2")
        .min_disk_space(5_000_000)
        .build_with_defaults(&cfg);
    assert_eq!(job.request_disk, "0");
}

#[test]
fn missing_now_date_is_generated() {
    let cfg = ConfigFileBuilder::new("/condor/logs").build();
    let mut job = JobBuilder::new("inv-1").build();
    job.now_date.clear();

    job.apply_launcher_defaults(&cfg);

    assert!(
        chrono::NaiveDateTime::parse_from_str(
            &job.now_date,
            condor_launcher::model::job::NOW_DATE_FORMAT
        )
        .is_ok(),
        "{}",
        job.now_date
    );
}

#[test]
fn sanitize_replaces_unsafe_characters_and_trims_images() {
    let mut job = JobBuilder::new("inv-1")
        .submitter("user name@example.org")
        .build();
    job.name = "My Analysis".to_string();
    job.steps[0].component.container.image.name = "  discoenv/wc ".to_string();
    job.steps[0].component.container.image.tag = "latest\n".to_string();

    job.sanitize();

    assert_eq!(job.submitter, "user_name_example.org");
    assert_eq!(job.name, "My_Analysis");
    assert_eq!(job.steps[0].component.container.image.name, "discoenv/wc");
    assert_eq!(job.steps[0].component.container.image.tag, "latest");
}

#[test]
fn directory_name_appends_the_timestamp_once() {
    let mut job = JobBuilder::new("inv-1").build();
    assert_eq!(job.directory_name(), "Word_Count_analysis1-2016-01-01-12-00-00.000");

    job.name = "Word_Count_analysis1-2016-01-01-12-00-00.000".to_string();
    assert_eq!(job.directory_name(), "Word_Count_analysis1-2016-01-01-12-00-00.000");
}

#[test]
fn workspace_dir_nests_submitter_and_run() {
    let cfg = ConfigFileBuilder::new("/condor/logs").build();
    let job = JobBuilder::new("inv-1").build_with_defaults(&cfg);

    assert_eq!(
        job.workspace_dir(),
        PathBuf::from(
            "/condor/logs/test_this_is_a_test/Word_Count_analysis1-2016-01-01-12-00-00.000/logs"
        )
    );
}

#[test]
fn concurrency_key_prefers_the_user_id() {
    let job = JobBuilder::new("inv-1")
        .user_id("00000000-0000-0000-0000-000000000001")
        .build();
    assert_eq!(job.user_id_for_submission(), "_00000000000000000000000000000001");

    let job = JobBuilder::new("inv-1").submitter("").build();
    // sha256("")
    assert_eq!(
        job.user_id_for_submission(),
        "_e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn distinct_inputs_normalise_collections() {
    let mut job = JobBuilder::new("inv-1")
        .input("/iplant/home/a.txt", "")
        .input("/iplant/home/a.txt", "t")
        .build();
    for value in ["/iplant/home/dir", "/iplant/home/dir/"] {
        job.steps[0].config.inputs.push(StepInput {
            value: value.to_string(),
            multiplicity: "collection".to_string(),
            ..StepInput::default()
        });
    }

    assert_eq!(job.distinct_input_count(), 2);
    assert_eq!(lease_uses(job.distinct_input_count()), 4);
    assert_eq!(lease_uses(0), 2);
    assert_eq!(job.inputs_with_tickets().len(), 1);
    assert_eq!(job.inputs_without_tickets().len(), 3);
}

#[test]
fn step_arguments_follow_param_order() {
    let job = JobBuilder::new("inv-1")
        .param("-o", "out.txt", 2)
        .param("", "input.txt", 0)
        .param("--verbose", "", 1)
        .build();

    assert_eq!(
        job.steps[0].arguments(),
        vec!["input.txt", "--verbose", "-o", "out.txt"]
    );
}

#[test]
fn update_message_uses_wire_names() -> TestResult {
    let update = UpdateMessage::new(JobDescription::stub("X"), JobState::Failed, "Job was killed");

    let value = serde_json::to_value(&update)?;

    assert_eq!(value["status"], "Failed");
    assert_eq!(value["message"], "Job was killed");
    assert_eq!(value["sender"], "condor-launcher");
    assert_eq!(value["version"], 0);
    assert_eq!(value["job"]["uuid"], "X");
    assert!(value["sent_on"].as_str().unwrap().parse::<i64>()? > 0);
    Ok(())
}

#[test]
fn stop_routing_names_embed_the_invocation() {
    assert_eq!(stop_request_key("abc"), "jobs.stops.abc");
    assert_eq!(stop_queue_name("abc"), "road-runner-abc-stops");
}

#[test]
fn mount_listing_is_read_in_both_shapes() {
    let legacy = json!({ "irods/": { "type": "cubbyhole" }, "sys/": {} });
    let nested = json!({ "data": { "irods/": { "type": "cubbyhole" } } });

    assert!(has_mount(&legacy, "irods"));
    assert!(has_mount(&nested, "irods/"));
    assert!(!has_mount(&legacy, "secret"));
    assert!(!has_mount(&json!({}), "irods"));
}
