//! Contract tests for worker stdin control lines.

use session_annotator::jobs::control::{run_control_writer, ControlCommand};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

#[test]
fn cancel_command_shape() {
    assert_eq!(
        serde_json::to_string(&ControlCommand::Cancel).unwrap(),
        r#"{"command":"cancel"}"#
    );
    assert_eq!(
        serde_json::from_str::<ControlCommand>(r#"{"command":"cancel"}"#).unwrap(),
        ControlCommand::Cancel
    );
    assert!(serde_json::from_str::<ControlCommand>(r#"{"command":"pause"}"#).is_err());
}

#[tokio::test]
async fn control_writer_emits_one_line_per_command_and_closes() {
    let (writer_end, mut reader_end) = tokio::io::duplex(1024);
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_control_writer("job-1".into(), writer_end, rx));

    tx.send(ControlCommand::Cancel).unwrap();
    tx.send(ControlCommand::Cancel).unwrap();
    drop(tx);
    task.await.unwrap().unwrap();

    let mut written = String::new();
    reader_end.read_to_string(&mut written).await.unwrap();
    assert_eq!(written, "{\"command\":\"cancel\"}\n{\"command\":\"cancel\"}\n");
}
