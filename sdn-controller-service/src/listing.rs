//! Text output for the `rules` and `hosts` commands

use sdn_core::Dpid;
use sdn_policy::{PolicyError, SwitchSessionController};

/// One line per baseline rule, in install order
pub fn rule_lines(
    controller: &SwitchSessionController,
    dpid: Dpid,
) -> Result<Vec<String>, PolicyError> {
    Ok(controller
        .baseline_rules(dpid)?
        .iter()
        .map(ToString::to_string)
        .collect())
}

/// `name<TAB>address<TAB>subnet`, in name order
pub fn host_lines(controller: &SwitchSessionController) -> Vec<String> {
    controller
        .directory()
        .hosts()
        .map(|h| format!("{}\t{}\t{}", h.name, h.address, h.subnet))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdn_policy::PolicySettings;

    fn controller() -> SwitchSessionController {
        SwitchSessionController::from_settings(&PolicySettings::default()).unwrap()
    }

    #[test]
    fn test_edge_switch_gets_flood_rule() {
        assert_eq!(
            rule_lines(&controller(), 1).unwrap(),
            vec!["priority=1,actions=FLOOD".to_string()]
        );
    }

    #[test]
    fn test_core_switch_gets_block_rules() {
        let lines = rule_lines(&controller(), 21).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "priority=1000,icmp,nw_src=172.16.10.100,actions=drop"
        );
        assert_eq!(
            lines[1],
            "priority=1100,ip,nw_src=172.16.10.100,nw_dst=10.0.4.10,actions=drop"
        );
    }

    #[test]
    fn test_unknown_switch_is_error() {
        assert!(matches!(
            rule_lines(&controller(), 99),
            Err(PolicyError::UnknownSwitch(99))
        ));
    }

    #[test]
    fn test_host_lines() {
        let lines = host_lines(&controller());
        assert_eq!(
            lines,
            vec![
                "h10\t10.0.1.10\t10.0.1.0/24",
                "h20\t10.0.2.20\t10.0.2.0/24",
                "h30\t10.0.3.30\t10.0.3.0/24",
                "hnotrust\t172.16.10.100\t172.16.10.0/24",
                "serv1\t10.0.4.10\t10.0.4.0/24",
            ]
        );
    }
}
