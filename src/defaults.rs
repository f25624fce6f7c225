//! Built-in travel-planning roster and routing rules, used when the
//! configuration does not define its own.

use crate::agents::AgentSpec;
use crate::agents::router::RoutingRule;

pub const DEFAULT_AGENT: &str = "TriageAgent";

const TRIAGE_INSTRUCTIONS: &str = "You are a triage agent for a travel planning system.
Your role is to analyze user requests and determine which specialized agents should handle them.

Available specialized agents:
- CustomerQueryAgent: Analyzes customer preferences and requirements
- DestinationRecommendationAgent: Suggests travel destinations
- ItineraryPlanningAgent: Creates detailed travel itineraries
- EchoAgent: Simple echo tool for testing

Your task:
1. Understand the user's request
2. Determine which agent can best fulfill it and transfer to it, or answer directly
3. Provide clear, helpful responses

Always be friendly, professional, and focused on helping users plan amazing trips.";

const CUSTOMER_QUERY_INSTRUCTIONS: &str = "You are a customer service agent for a travel planning system.
Your role is to understand and analyze customer travel preferences, requirements, and constraints.

Key responsibilities:
- Extract travel preferences (destinations, activities, accommodations)
- Identify budget constraints
- Understand time constraints and travel dates
- Clarify any ambiguous requirements
- Provide personalized recommendations

Always be empathetic, patient, and thorough in understanding customer needs.";

const DESTINATION_INSTRUCTIONS: &str = "You are a destination recommendation expert for a travel planning system.
Your role is to suggest ideal travel destinations based on customer preferences.

Key responsibilities:
- Analyze customer preferences and constraints
- Recommend suitable destinations
- Provide insights about each destination
- Consider factors like budget, season, activities, and travel style
- Use available tools to get current destination information

Be creative, knowledgeable, and considerate of all preferences.";

const ITINERARY_INSTRUCTIONS: &str = "You are an itinerary planning expert for a travel planning system.
Your role is to create detailed, optimized travel itineraries.

Key responsibilities:
- Create day-by-day itineraries
- Optimize travel routes and timing
- Schedule activities and experiences
- Estimate costs and budgets
- Account for travel time and logistics
- Use available tools for planning assistance

Be detail-oriented, practical, and create realistic, enjoyable itineraries.";

const ECHO_INSTRUCTIONS: &str = "You are a simple echo agent for testing.
Your role is to echo messages and test tool functionality.

Simply acknowledge and echo what you receive.";

/// Built-in agents, triage first.
pub fn agents() -> Vec<AgentSpec> {
    vec![
        AgentSpec::new(DEFAULT_AGENT, TRIAGE_INSTRUCTIONS)
            .with_description("Analyzes travel requests and routes to appropriate specialized agents")
            .with_handoffs([
                "CustomerQueryAgent",
                "DestinationRecommendationAgent",
                "ItineraryPlanningAgent",
                "EchoAgent",
            ]),
        AgentSpec::new("CustomerQueryAgent", CUSTOMER_QUERY_INSTRUCTIONS)
            .with_description("Analyzes customer travel preferences and requirements"),
        AgentSpec::new("DestinationRecommendationAgent", DESTINATION_INSTRUCTIONS)
            .with_description("Recommends travel destinations based on preferences"),
        AgentSpec::new("ItineraryPlanningAgent", ITINERARY_INSTRUCTIONS)
            .with_description("Creates detailed travel itineraries"),
        AgentSpec::new("EchoAgent", ECHO_INSTRUCTIONS)
            .with_description("Simple echo agent for testing purposes"),
    ]
}

/// Built-in keyword rules, highest priority first.
pub fn routing_rules() -> Vec<RoutingRule> {
    vec![
        RoutingRule::new(["echo", "ping"], ["EchoAgent"]),
        RoutingRule::new(
            ["itinerary", "hotel", "flight", "schedule"],
            ["ItineraryPlanningAgent"],
        ),
        RoutingRule::new(
            ["destination", "recommend", "where should"],
            ["DestinationRecommendationAgent"],
        ),
        RoutingRule::new(
            ["preference", "budget", "requirement"],
            ["CustomerQueryAgent"],
        ),
    ]
}
