use stageboard::output::HumanOutput;

#[test]
fn human_output_renders_every_section() {
    let mut human = HumanOutput::new("stageboard board: default");
    human.push_summary("tasks", "2");
    human.push_detail("Backlog (1): t1 Draft");
    human.push_warning("board unavailable: task stream disconnected");
    human.push_next_step("stageboard stage add <id>");

    let rendered = human.to_string();
    assert!(rendered.contains("stageboard board: default"));
    assert!(rendered.contains("Summary:"));
    assert!(rendered.contains("- tasks: 2"));
    assert!(rendered.contains("Details:"));
    assert!(rendered.contains("- Backlog (1): t1 Draft"));
    assert!(rendered.contains("Warnings:"));
    assert!(rendered.contains("- board unavailable: task stream disconnected"));
    assert!(rendered.contains("Next steps:"));
    assert!(rendered.contains("- stageboard stage add <id>"));
}

#[test]
fn header_alone_when_nothing_else_is_pushed() {
    let human = HumanOutput::new("stageboard init: nothing to do");
    let rendered = human.to_string();
    assert_eq!(rendered, "stageboard init: nothing to do");
}
