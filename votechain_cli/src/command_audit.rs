use votechain::{FileStore, Gateway};

pub fn command_audit(gateway: &Gateway<FileStore>) {
    let snapshot = gateway.snapshot();
    crate::print_json(&snapshot);

    if !snapshot.all_valid() {
        log::error!("audit of election {} found invalid signatures or tree heads", snapshot.election_id);
        std::process::exit(2);
    }
}
