// Session-driven routing. `route` is the pure part; `Navigator` applies the
// level-triggered discipline on top of it for whatever presentation layer
// embeds this crate.
use crate::common::models::Session;

/// The three navigable graphs. Only one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppGraph {
    /// Blocking state before the first identity callback; no screens.
    Loading,
    Auth,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    Register,
    Conversation,
    Profile,
}

impl AppGraph {
    /// Default entry screen of the graph, reset to on every graph switch.
    pub fn entry_screen(self) -> Option<Screen> {
        match self {
            AppGraph::Loading => None,
            AppGraph::Auth => Some(Screen::SignIn),
            AppGraph::Chat => Some(Screen::Conversation),
        }
    }

    pub fn contains(self, screen: Screen) -> bool {
        match self {
            AppGraph::Loading => false,
            AppGraph::Auth => matches!(screen, Screen::SignIn | Screen::Register),
            AppGraph::Chat => matches!(screen, Screen::Conversation | Screen::Profile),
        }
    }
}

/// Pure function of the session status alone. SignedIn routes to the chat
/// graph whether or not the profile fields are filled in.
pub fn route(session: &Session) -> AppGraph {
    match session {
        Session::Unknown => AppGraph::Loading,
        Session::SignedOut => AppGraph::Auth,
        Session::SignedIn(_) => AppGraph::Chat,
    }
}

/// Tracks the active graph and screen. Level-triggered: a session change
/// that switches graphs resets to the new graph's entry screen, and no
/// history survives the flip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    graph: AppGraph,
    screen: Option<Screen>,
}

impl Navigator {
    pub fn new() -> Self {
        Self {
            graph: AppGraph::Loading,
            screen: None,
        }
    }

    pub fn graph(&self) -> AppGraph {
        self.graph
    }

    pub fn screen(&self) -> Option<Screen> {
        self.screen
    }

    /// Re-evaluates the route for a new session value. Returns true when the
    /// active graph changed (and navigation was reset).
    pub fn apply_session(&mut self, session: &Session) -> bool {
        let next = route(session);
        if next == self.graph {
            return false;
        }
        self.graph = next;
        self.screen = next.entry_screen();
        true
    }

    /// Moves within the active graph. Screens of other graphs are rejected.
    pub fn navigate(&mut self, screen: Screen) -> bool {
        if !self.graph.contains(screen) {
            return false;
        }
        self.screen = Some(screen);
        true
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::UserProfile;

    fn signed_in() -> Session {
        Session::SignedIn(UserProfile {
            user_id: "u1".into(),
            display_name: None,
            avatar_url: None,
        })
    }

    #[test]
    fn route_depends_on_status_alone() {
        assert_eq!(route(&Session::Unknown), AppGraph::Loading);
        assert_eq!(route(&Session::SignedOut), AppGraph::Auth);
        assert_eq!(route(&signed_in()), AppGraph::Chat);
        // repeated calls with the same status agree
        assert_eq!(route(&Session::SignedOut), route(&Session::SignedOut));
        // profile completeness does not gate the chat graph
        let complete = Session::SignedIn(UserProfile {
            user_id: "u2".into(),
            display_name: Some("Anna".into()),
            avatar_url: Some("http://example/avatar".into()),
        });
        assert_eq!(route(&complete), AppGraph::Chat);
    }

    #[test]
    fn signed_out_event_selects_auth_graph_only() {
        let mut nav = Navigator::new();
        assert_eq!(nav.graph(), AppGraph::Loading);
        assert!(nav.apply_session(&Session::SignedOut));
        assert_eq!(nav.graph(), AppGraph::Auth);
        assert_eq!(nav.screen(), Some(Screen::SignIn));
        // chat-graph screens cannot be reached from here
        assert!(!nav.navigate(Screen::Conversation));
        assert!(!nav.navigate(Screen::Profile));
    }

    #[test]
    fn graph_flip_resets_to_entry_screen() {
        let mut nav = Navigator::new();
        nav.apply_session(&signed_in());
        assert!(nav.navigate(Screen::Profile));
        assert_eq!(nav.screen(), Some(Screen::Profile));

        nav.apply_session(&Session::SignedOut);
        assert!(nav.navigate(Screen::Register));

        // back in: no history, entry screen again
        assert!(nav.apply_session(&signed_in()));
        assert_eq!(nav.screen(), Some(Screen::Conversation));
    }

    #[test]
    fn same_status_event_does_not_reset_navigation() {
        let mut nav = Navigator::new();
        nav.apply_session(&signed_in());
        nav.navigate(Screen::Profile);
        // a profile update re-delivers a SignedIn session
        assert!(!nav.apply_session(&signed_in()));
        assert_eq!(nav.screen(), Some(Screen::Profile));
    }
}
