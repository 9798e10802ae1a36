use crate::config::QueueNames;
use crate::models::StageKind;

/// Where a stage reads its working document from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    /// The message body carries the whole document.
    Message,
    /// The message is a pointer; the latest `job_data` is re-read from the
    /// store so updates from other consumers are not lost.
    Store,
}

/// What a stage publishes downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    Document,
    Pointer,
}

/// Fixed wiring of one stage into the queue chain.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRoute {
    pub input_queue: String,
    pub input: InputSource,
    pub outputs: Vec<String>,
    pub forward: ForwardMode,
}

impl StageRoute {
    pub fn for_stage(stage: StageKind, queues: &QueueNames) -> Self {
        match stage {
            StageKind::Harvest => Self {
                input_queue: queues.scrape.clone(),
                input: InputSource::Message,
                outputs: vec![queues.resolve.clone()],
                forward: ForwardMode::Document,
            },
            StageKind::Resolve => Self {
                input_queue: queues.resolve.clone(),
                input: InputSource::Message,
                outputs: vec![queues.extract.clone()],
                forward: ForwardMode::Document,
            },
            StageKind::Extract => Self {
                input_queue: queues.extract.clone(),
                input: InputSource::Store,
                outputs: vec![queues.classify.clone(), queues.originality.clone()],
                forward: ForwardMode::Pointer,
            },
            StageKind::Classify => Self {
                input_queue: queues.classify.clone(),
                input: InputSource::Store,
                outputs: Vec::new(),
                forward: ForwardMode::Pointer,
            },
            StageKind::Originality => Self {
                input_queue: queues.originality.clone(),
                input: InputSource::Store,
                outputs: Vec::new(),
                forward: ForwardMode::Pointer,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_is_connected() {
        let queues = QueueNames::default();
        let harvest = StageRoute::for_stage(StageKind::Harvest, &queues);
        let resolve = StageRoute::for_stage(StageKind::Resolve, &queues);
        let extract = StageRoute::for_stage(StageKind::Extract, &queues);

        assert_eq!(harvest.input_queue, "scrape_requests");
        assert_eq!(harvest.outputs, vec![resolve.input_queue.clone()]);
        assert_eq!(resolve.outputs, vec![extract.input_queue.clone()]);
        assert_eq!(
            extract.outputs,
            vec![
                StageRoute::for_stage(StageKind::Classify, &queues).input_queue,
                StageRoute::for_stage(StageKind::Originality, &queues).input_queue,
            ]
        );
    }

    #[test]
    fn test_branches_are_terminal_and_store_backed() {
        let queues = QueueNames::default();
        for stage in [StageKind::Classify, StageKind::Originality] {
            let route = StageRoute::for_stage(stage, &queues);
            assert!(route.outputs.is_empty());
            assert_eq!(route.input, InputSource::Store);
        }
    }
}
