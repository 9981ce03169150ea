use crate::errors::PilotResult;
use crate::llm::types::{ChatMessage, ContentPart, PredictionRequest};

pub const SYSTEM_PROMPT: &str = r#"You are a GUI agent operating an Android phone. You are given a task, your recent action history and a screenshot of the current screen. Choose the single next action.

## Output format
Put your reasoning in <thinking></thinking> tags, then exactly one JSON object inside <tool_call></tool_call> tags:
<thinking>
...
</thinking>
<tool_call>
{"name": "mobile_use", "arguments": <action object>}
</tool_call>

## Action space
Coordinates are fractions of the screen: [0, 0] is the top-left corner and [1, 1] the bottom-right.
{"action": "click", "coordinate": [x, y]}
{"action": "long_press", "coordinate": [x, y]}
{"action": "double_click", "coordinate": [x, y]}
{"action": "type", "text": "..."}  # the input field must already be focused
{"action": "swipe", "direction": "up|down|left|right", "coordinate": [x, y]}  # coordinate optional, defaults to the screen centre
{"action": "swipe", "start": [x1, y1], "end": [x2, y2]}
{"action": "drag", "start_coordinate": [x1, y1], "end_coordinate": [x2, y2]}
{"action": "pinch", "coordinate": [x, y], "direction": "in|out"}  # in zooms out, out zooms in
{"action": "rotate", "coordinate": [x, y], "direction": "clockwise|counterclockwise"}
{"action": "open", "text": "app name"}
{"action": "system_button", "button": "back|home|menu|recent|enter"}
{"action": "wait", "duration": N}  # seconds, 1 to 60, default 2
{"action": "note", "text": "progress note"}
{"action": "ask_user", "question": "..."}  # only when the task cannot continue without the user
{"action": "answer", "text": "..."}  # final answer to a question, ends the task
{"action": "terminate", "status": "success|fail"}

## Rules
- Interact with exactly the item the task names, never a similar one.
- Check the previous action took effect before moving on.
- Do not repeat the same action on the same spot more than twice; try something else.
- Only terminate with success once the task is fully done."#;

/// Builds the chat for one step: system prompt, the replayed history as
/// assistant turns, then the current screenshot with step metadata.
pub fn build_messages(req: &PredictionRequest, max_image_side: u32) -> PilotResult<Vec<ChatMessage>> {
    let mut messages = Vec::with_capacity(req.history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));

    for turn in &req.history {
        let mut text = String::new();
        if let Some(reasoning) = &turn.reasoning {
            text.push_str(&format!("<thinking>\n{reasoning}\n</thinking>\n"));
        }
        let call = serde_json::json!({"name": "mobile_use", "arguments": turn.action});
        text.push_str(&format!("<tool_call>\n{call}\n</tool_call>"));
        messages.push(ChatMessage::assistant(text));
    }

    let mut header = format!(
        "Task: {}\nStep {} of {}.",
        req.instruction, req.step, req.max_steps
    );
    if let Some(reply) = &req.user_reply {
        header.push_str(&format!("\nThe user answered your question: {reply}"));
    }

    messages.push(ChatMessage::user(vec![
        ContentPart::text(header),
        ContentPart::png_base64(&req.screenshot.model_payload(max_image_side)?),
    ]));
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::screenshot::{blank_png, Screenshot};
    use crate::llm::types::{HistoryTurn, MessageContent};
    use serde_json::json;

    fn request(history: Vec<HistoryTurn>, user_reply: Option<String>) -> PredictionRequest {
        PredictionRequest {
            instruction: "Open Settings".into(),
            screenshot: Screenshot::from_png(blank_png(4, 8)).unwrap(),
            step: 2,
            max_steps: 10,
            history,
            user_reply,
        }
    }

    #[test]
    fn test_history_replayed_as_assistant_turns() {
        let history = vec![HistoryTurn {
            step: 1,
            reasoning: Some("go home first".into()),
            action: json!({"action": "system_button", "button": "home"}),
        }];
        let messages = build_messages(&request(history, None), 0).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "assistant");
        let MessageContent::Text(text) = &messages[1].content else {
            panic!("assistant turn must be text");
        };
        assert!(text.contains("go home first"));
        assert!(text.contains("\"button\":\"home\""));
    }

    #[test]
    fn test_user_turn_carries_metadata_reply_and_image() {
        let messages = build_messages(&request(vec![], Some("the blue one".into())), 0).unwrap();
        let MessageContent::Parts(parts) = &messages[1].content else {
            panic!("user turn must be multipart");
        };
        let ContentPart::Text { text } = &parts[0] else {
            panic!("first part is text");
        };
        assert!(text.contains("Step 2 of 10"));
        assert!(text.contains("the blue one"));
        let ContentPart::ImageUrl { image_url } = &parts[1] else {
            panic!("second part is the screenshot");
        };
        assert!(image_url.url.starts_with("data:image/png;base64,"));
    }
}
